// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_sampler_defaults_to_zero_sample() {
    let sampler = FakeSampler::new();
    let sample = sampler.sample(42).unwrap();
    assert_eq!(sample, ResourceSample::default());
}

#[test]
fn fake_sampler_plays_script_and_repeats_last() {
    let sampler = FakeSampler::new();
    sampler.set_samples(
        7,
        vec![
            ResourceSample {
                cpu_percent: 10.0,
                rss_bytes: 100,
                open_handles: 4,
            },
            ResourceSample {
                cpu_percent: 90.0,
                rss_bytes: 200,
                open_handles: 5,
            },
        ],
    );

    assert_eq!(sampler.sample(7).unwrap().cpu_percent, 10.0);
    assert_eq!(sampler.sample(7).unwrap().cpu_percent, 90.0);
    // last sample repeats
    assert_eq!(sampler.sample(7).unwrap().cpu_percent, 90.0);
    assert_eq!(sampler.sample(7).unwrap().rss_bytes, 200);
}

#[test]
fn procfs_samples_own_process() {
    let sampler = ProcfsSampler::new();
    let pid = std::process::id();

    let sample = sampler.sample(pid).unwrap();
    assert!(sample.rss_bytes > 0);
    assert!(sample.open_handles > 0);
    // first observation of a pid has no cpu baseline
    assert_eq!(sample.cpu_percent, 0.0);

    let again = sampler.sample(pid).unwrap();
    assert!(again.cpu_percent >= 0.0);
}

#[test]
fn procfs_missing_pid_errors() {
    let sampler = ProcfsSampler::new();
    // pid 0 has no procfs entry visible to us
    assert!(matches!(sampler.sample(0), Err(SampleError::NotFound(0))));
}
