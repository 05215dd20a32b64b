// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use lepidoptera::classify::upload::clean_filename;
use lepidoptera::classify::{interpret_scores, preprocess, Classification};

#[derive(Arbitrary, Debug)]
struct Input {
    image: Vec<u8>,
    file_name: String,
    scores: Vec<f32>,
    class_count: u8,
}

fuzz_target!(|input: Input| {
    let _ = preprocess(&input.image, (16, 16));

    let clean = clean_filename(&input.file_name);
    assert!(!clean.is_empty());
    assert!(!clean.contains('/') && !clean.contains('\\'));

    let labels: Vec<String> = (0..input.class_count).map(|i| format!("class-{}", i)).collect();
    match interpret_scores(&input.scores, &labels) {
        Classification::Label { label, .. } => assert!(labels.contains(&label)),
        Classification::Unknown { index: Some(i) } => assert!(i >= labels.len()),
        Classification::Unknown { index: None } => {}
    }
});
