//! Format planning.
//!
//! Maps a caller-chosen format descriptor to the concrete selector passed
//! to the extraction engine. Video-only streams get a best-effort audio
//! stream paired in so the merged artifact always carries sound.

/// How the target selector was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Descriptor passed through unchanged.
    Direct,
    /// Video-only descriptor paired with a best-effort audio stream.
    VideoPlusSyntheticAudio,
    /// Caller already specified a `video+audio` pair.
    ManualPair,
}

/// Concrete selector handed to the extraction engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub target: String,
    pub strategy: FetchStrategy,
}

/// Derives the fetch plan from a format descriptor.
///
/// Rules, in order:
/// 1. A descriptor containing `+` is an explicit pair and is trusted as-is.
/// 2. A descriptor labelled video-only gets `+bestaudio` appended to its
///    leading stream ID.
/// 3. Anything else passes through unchanged.
pub fn plan(descriptor: &str) -> FetchPlan {
    let descriptor = descriptor.trim();

    if descriptor.contains('+') {
        return FetchPlan {
            target: descriptor.to_string(),
            strategy: FetchStrategy::ManualPair,
        };
    }

    if descriptor.contains("Video Only") || descriptor.contains("video_only") {
        let stream_id = descriptor.split_whitespace().next().unwrap_or(descriptor);
        return FetchPlan {
            target: format!("{}+bestaudio", stream_id),
            strategy: FetchStrategy::VideoPlusSyntheticAudio,
        };
    }

    FetchPlan {
        target: descriptor.to_string(),
        strategy: FetchStrategy::Direct,
    }
}
