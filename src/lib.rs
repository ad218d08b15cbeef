//! # Pixboard
//!
//! The conversion and caching core of a retro display simulator. Any image
//! dropped on the display (a file, or raw bytes from a clipboard or API call)
//! is turned into two small GIFs that look right on an LED matrix, CRT, LCD or
//! VFD: a pixelated one and a smooth one. Both are cached by content hash so
//! each picture is converted exactly once.
//!
//! # Architecture
//!
//! ```text
//! ImageSource ─▶ source::prepare ─▶ ContentHash ─▶ cache hit? ─▶ path
//!                                                     │ miss
//!                                                     ▼
//!                                   single-flight guard ─▶ Converter × 2
//!                                                     │
//!                                                     ▼
//!                                   staging files ─▶ rename ─▶ path
//! ```
//!
//! A [`pipeline::CachePipeline`] is built once at startup and shared behind an
//! `Arc`. Callers that must not block hand work to a [`worker::Worker`]; the
//! result goes to a [`display::DisplayState`], which falls back to the last
//! good image when a resolve fails.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`cache`] | Content hashes, rendition file layout, seen-set, hit/miss counters |
//! | [`source`] | Image sources: validation, canonical hashing, intermediate GIF |
//! | [`imaging`] | Rendition geometry and the `Converter` trait (gifsicle, native) |
//! | [`pipeline`] | Resolve: lookup, single-flight conversion, atomic publish, errors |
//! | [`worker`] | One-slot background queue in front of the pipeline |
//! | [`display`] | Display mode, current/backup rendition, fallback on failure |
//! | [`config`] | `pixboard.toml` loading, merging over stock defaults, validation |
//! | [`logging`] | `log` + `env_logger` setup from CLI verbosity |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Hashing
//!
//! Cache keys are SHA-256 over the source's bytes, not its path or mtime.
//! Renaming or copying a picture keeps its entry; editing it makes a new one.
//! In-memory sources are decoded and re-encoded to PNG before hashing, so the
//! same pixels delivered in two formats share an entry.
//!
//! ## Two Renditions, One Conversion
//!
//! Switching between the pixelated and smooth look is instant because both
//! renditions are produced by the same conversion and always exist together.
//! An entry counts as cached only when both files are on disk.
//!
//! ## Nothing Half-Written
//!
//! Converters write to uniquely named staging files in the cache directory.
//! Both are renamed into place only after both passes succeed, and the hash is
//! marked seen only after that. A crash or a failed pass leaves no entry
//! behind, and two processes sharing a cache directory never see each other's
//! partial output.
//!
//! ## gifsicle or Native
//!
//! The default converter pipes two `gifsicle` processes together, which keeps
//! animated GIFs animated. The native converter does the same resampling with
//! the `image` crate: first frame only, but no external tool, and
//! byte-for-byte deterministic.

pub mod cache;
pub mod config;
pub mod display;
pub mod imaging;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod worker;
