//! Mixing Tests
//!
//! Properties of the block mixer observed through the public `Project` API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;
use test_case::test_case;

use reorch::engine::{AudioBuffer, Project, Track};
use reorch::ReorchError;

const RATE: u32 = 1000;

fn constant(name: &str, value: f32, frames: usize, channels: usize) -> Track {
    let buffer = AudioBuffer::from_interleaved(vec![value; frames * channels], channels, RATE)
        .unwrap();
    Track::new(name, buffer)
}

fn ramp(name: &str, frames: usize, channels: usize, scale: f32) -> Track {
    let samples = (0..frames * channels)
        .map(|i| ((i % 97) as f32 / 97.0 - 0.5) * scale)
        .collect();
    Track::new(name, AudioBuffer::from_interleaved(samples, channels, RATE).unwrap())
}

// === Shape ===

#[test_case(0, 100 ; "from start")]
#[test_case(2900, 500 ; "across the shorter track end")]
#[test_case(10_000, 64 ; "past every track")]
#[test_case(0, 0 ; "empty block")]
fn test_block_shape_is_always_full(start: usize, frames: usize) {
    let project = Project::new();
    project.add_track(constant("mono", 0.1, 3000, 1)).unwrap();
    project.add_track(constant("stereo", 0.1, 5000, 2)).unwrap();

    let block = project.mix_block(start, frames);
    assert_eq!(block.frames(), frames);
    assert_eq!(block.channels(), 2);
    assert_eq!(block.as_interleaved().len(), frames * 2);
}

#[test]
fn test_empty_project_block_is_silent_mono() {
    let block = Project::new().mix_block(0, 256);
    assert_eq!(block.channels(), 1);
    assert_eq!(block.into_interleaved(), vec![0.0; 256]);
}

// === Mute / gain / clip ===

#[test]
fn test_all_muted_is_silent() {
    let project = Project::new();
    for i in 0..3 {
        let track = project.add_track(ramp(&format!("t{i}"), 2000, 2, 1.0)).unwrap();
        track.set_mute(true);
    }

    let block = project.mix_block(100, 512);
    assert!(block.as_interleaved().iter().all(|&s| s == 0.0));
}

#[test]
fn test_clipping_is_hard() {
    let project = Project::new();
    for value in [0.8, 0.7, -0.2] {
        let track = project.add_track(constant("loud", value, 100, 1)).unwrap();
        track.set_gain(1.5).unwrap();
    }
    let negative = project.add_track(constant("neg", -1.0, 50, 1)).unwrap();
    negative.set_gain(1.5).unwrap();

    let block = project.mix_block(0, 100);
    // 1.5 * (0.8 + 0.7 - 0.2 - 1.0) = 0.45 for the first 50 frames
    assert_abs_diff_eq!(block.sample(0, 0), 0.45, epsilon = 1e-5);
    // 1.5 * 1.3 = 1.95 clamps to 1.0 after the negative track ends
    assert_eq!(block.sample(50, 0), 1.0);
    assert!(block.as_interleaved().iter().all(|s| (-1.0..=1.0).contains(s)));
}

#[test]
fn test_clipping_negative_side() {
    let project = Project::new();
    project.add_track(constant("a", -0.9, 10, 1)).unwrap();
    project.add_track(constant("b", -0.9, 10, 1)).unwrap();
    assert_eq!(project.mix_block(0, 10).into_interleaved(), vec![-1.0; 10]);
}

// === Algebraic properties ===

#[test]
fn test_mixing_is_order_independent() {
    let forward = Project::new();
    let reverse = Project::new();
    let tracks = [(0.3, 1500, 1), (0.9, 800, 2), (0.5, 2000, 2)];

    for (i, &(scale, frames, channels)) in tracks.iter().enumerate() {
        forward.add_track(ramp(&format!("t{i}"), frames, channels, scale)).unwrap();
    }
    for (i, &(scale, frames, channels)) in tracks.iter().enumerate().rev() {
        reverse.add_track(ramp(&format!("t{i}"), frames, channels, scale)).unwrap();
    }

    let a = forward.mix_block(0, 2048);
    let b = reverse.mix_block(0, 2048);
    assert_eq!(a.channels(), b.channels());
    for (x, y) in a.as_interleaved().iter().zip(b.as_interleaved()) {
        assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_mix_block_is_idempotent() {
    let project = Project::new();
    project.add_track(ramp("a", 4000, 2, 0.7)).unwrap();
    project.add_track(ramp("b", 2500, 1, 0.4)).unwrap();

    assert_eq!(project.mix_block(1234, 1024), project.mix_block(1234, 1024));
}

// === Scenarios ===

#[test]
fn test_single_track_at_half_gain() {
    let project = Project::new();
    let track = project.add_track(constant("ones", 1.0, 4000, 1)).unwrap();
    track.set_gain(0.5).unwrap();
    assert_abs_diff_eq!(track.duration(), 4.0, epsilon = 1e-9);

    let block = project.mix_block(0, 1000);
    assert_eq!(block.frames(), 1000);
    assert_eq!(block.into_interleaved(), vec![0.5; 1000]);
}

#[test]
fn test_shorter_track_is_silent_past_its_end() {
    let project = Project::new();
    project.add_track(constant("three", 0.25, 3000, 1)).unwrap();
    project.add_track(constant("five", 0.125, 5000, 1)).unwrap();

    let block = project.mix_block(4000, 1000);
    assert_eq!(block.into_interleaved(), vec![0.125; 1000]);
}

#[test]
fn test_isolate_duration_matches_range() {
    let project = Project::new();
    project.add_track(ramp("src", 10_000, 2, 1.0)).unwrap();

    let isolated = project.isolate(0, 1.2345, 3.5).unwrap();
    assert_abs_diff_eq!(isolated.duration(), 3.5 - 1.2345, epsilon = 1.0 / RATE as f64);
    assert_eq!(project.len(), 2);
}

#[test_case(2.0, 2.0 ; "zero length")]
#[test_case(3.0, 1.0 ; "inverted")]
fn test_isolate_empty_range_fails(start: f64, end: f64) {
    let project = Project::new();
    project.add_track(ramp("src", 10_000, 1, 1.0)).unwrap();
    assert!(matches!(
        project.isolate(0, start, end),
        Err(ReorchError::EmptySelection { .. })
    ));
    assert_eq!(project.len(), 1);
}

#[test]
fn test_isolate_error_reports_requested_range() {
    let project = Project::new();
    project.add_track(ramp("src", 10_000, 1, 1.0)).unwrap();

    let message = project.isolate(0, 3.0, 1.0).unwrap_err().to_string();
    assert!(message.contains("3.000s"), "{message}");
    assert!(message.contains("1.000s"), "{message}");
}

// === Concurrency ===

#[test]
fn test_mixing_during_concurrent_edits() {
    let project = Arc::new(Project::new());
    project.add_track(constant("base", 0.1, 4096, 2)).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let editor = {
        let project = Arc::clone(&project);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut round = 0u32;
            while !stop.load(Ordering::Relaxed) {
                let track = project
                    .add_track(constant("extra", 0.2, 1024 + (round as usize % 7) * 300, 1))
                    .unwrap();
                track.set_gain(1.0 + (round % 3) as f32 * 0.25).unwrap();
                track.set_mute(round % 2 == 0);
                if project.len() > 4 {
                    project.remove_track(1);
                }
                round = round.wrapping_add(1);
            }
        })
    };

    for i in 0..2000 {
        let block = project.mix_block((i * 37) % 4096, 256);
        assert_eq!(block.frames(), 256);
        assert_eq!(block.channels(), 2);
        assert!(block.as_interleaved().iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    }

    stop.store(true, Ordering::Relaxed);
    editor.join().unwrap();
}
