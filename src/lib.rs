//! Tarjama - translated, watermarked subtitles for online videos
//!
//! A four stage pipeline: fetch a video, transcribe its speech to SRT,
//! translate the SRT and burn it into a new copy of the video with ffmpeg.

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod media;
pub mod naming;
pub mod progress;
pub mod subtitle;
pub mod transcribe;
pub mod translate;
pub mod workflow;
