//! Format catalog processing.
//!
//! Turns the raw format list from a probe into a short, user-facing
//! catalog: combined streams first, then audio, then video-only, deduped
//! by quality label and capped. When the source publishes no combined
//! stream at all, a best video+audio pair is synthesized so the top
//! choice still plays with sound.

use log::debug;
use serde::{Deserialize, Serialize};

const CATALOG_LIMIT: usize = 8;
const MIN_HEIGHT: u32 = 144;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png", "gif", "webp"];

/// One format entry as reported by the extraction engine's JSON dump.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub fps: Option<f64>,
    pub abr: Option<f64>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
    pub format_note: Option<String>,
}

/// Kind of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    Combined,
    VideoOnly,
    AudioOnly,
    BestCombined,
}

/// One user-facing catalog entry.
#[derive(Debug, Clone, Serialize)]
pub struct FormatOption {
    pub format_id: String,
    pub quality: String,
    pub ext: String,
    pub filesize: u64,
    #[serde(rename = "type")]
    pub kind: FormatKind,
    pub height: u32,
    pub width: u32,
    pub fps: f64,
    pub vcodec: String,
    pub acodec: String,
    pub abr: f64,
}

struct Classified {
    option: FormatOption,
    priority: u8,
}

fn has_codec(codec: &Option<String>) -> bool {
    matches!(codec.as_deref(), Some(c) if !c.is_empty() && c != "none" && c != "null")
}

/// Height inferred from the format note when the engine reports none.
fn infer_height(fmt: &RawFormat) -> u32 {
    if let Some(h) = fmt.height.filter(|&h| h > 0) {
        return h;
    }
    let note = fmt.format_note.as_deref().unwrap_or("").to_lowercase();
    for &h in &[1080u32, 720, 480, 360, 240] {
        if note.contains(&h.to_string()) {
            return h;
        }
    }
    0
}

fn classify(fmt: &RawFormat) -> Option<Classified> {
    let format_id = fmt.format_id.clone().unwrap_or_else(|| "unknown".to_string());
    let ext = fmt.ext.clone().unwrap_or_else(|| "mp4".to_string());

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }

    let has_video = has_codec(&fmt.vcodec);
    let has_audio = has_codec(&fmt.acodec);
    let height = infer_height(fmt);
    let width = fmt.width.unwrap_or(0);
    let filesize = fmt.filesize.or(fmt.filesize_approx).unwrap_or(0);
    let fps = fmt.fps.unwrap_or(0.0);
    let abr = fmt.abr.unwrap_or(0.0);
    let vcodec = fmt.vcodec.clone().unwrap_or_else(|| "unknown".to_string());
    let acodec = fmt.acodec.clone().unwrap_or_else(|| "unknown".to_string());

    if has_video && has_audio && height >= MIN_HEIGHT {
        Some(Classified {
            option: FormatOption {
                format_id,
                quality: format!("{}p (Video + Audio)", height),
                ext,
                filesize,
                kind: FormatKind::Combined,
                height,
                width,
                fps,
                vcodec,
                acodec,
                abr,
            },
            priority: 1,
        })
    } else if has_video && !has_audio && height >= MIN_HEIGHT {
        Some(Classified {
            option: FormatOption {
                format_id,
                quality: format!("{}p (Video Only)", height),
                ext,
                filesize,
                kind: FormatKind::VideoOnly,
                height,
                width,
                fps,
                vcodec,
                acodec: "none".to_string(),
                abr: 0.0,
            },
            priority: 3,
        })
    } else if has_audio && !has_video {
        Some(Classified {
            option: FormatOption {
                format_id,
                quality: "Audio Only".to_string(),
                ext: if ext == "m4a" || ext == "mp3" { "mp3".to_string() } else { ext },
                filesize,
                kind: FormatKind::AudioOnly,
                height: 0,
                width: 0,
                fps: 0.0,
                vcodec: "none".to_string(),
                acodec,
                abr,
            },
            priority: 2,
        })
    } else if !has_video && !has_audio && (height > 0 || width > 0) {
        // Codec info missing but the entry carries dimensions; treat as
        // playable video rather than dropping it.
        Some(Classified {
            option: FormatOption {
                format_id,
                quality: if height > 0 { format!("{}p", height) } else { "Video".to_string() },
                ext,
                filesize,
                kind: FormatKind::Combined,
                height,
                width,
                fps,
                vcodec: "unknown".to_string(),
                acodec: "unknown".to_string(),
                abr,
            },
            priority: 2,
        })
    } else {
        None
    }
}

/// Builds the catalog from a raw probe format list. Returns an empty
/// catalog when nothing usable remains.
pub fn build_catalog(raw: &[RawFormat]) -> Vec<FormatOption> {
    let mut classified: Vec<Classified> = raw.iter().filter_map(classify).collect();

    let no_combined = !classified
        .iter()
        .any(|c| matches!(c.option.kind, FormatKind::Combined | FormatKind::BestCombined));
    let has_video_only = classified.iter().any(|c| c.option.kind == FormatKind::VideoOnly);
    let has_audio_only = classified.iter().any(|c| c.option.kind == FormatKind::AudioOnly);

    if no_combined && has_video_only && has_audio_only {
        if let Some(synth) = synthesize_best_pair(&classified) {
            debug!("Synthesized best combined format: {}", synth.option.format_id);
            classified.push(synth);
        }
    }

    classified.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.option.height.cmp(&a.option.height))
            .then(b.option.abr.total_cmp(&a.option.abr))
    });

    let mut seen = std::collections::HashSet::new();
    let mut catalog = Vec::new();
    for c in classified {
        if seen.insert(c.option.quality.clone()) {
            catalog.push(c.option);
            if catalog.len() >= CATALOG_LIMIT {
                break;
            }
        }
    }
    catalog
}

fn synthesize_best_pair(classified: &[Classified]) -> Option<Classified> {
    let best_video = classified
        .iter()
        .filter(|c| c.option.kind == FormatKind::VideoOnly)
        .max_by_key(|c| c.option.height)?;
    let best_audio = classified
        .iter()
        .filter(|c| c.option.kind == FormatKind::AudioOnly)
        .max_by(|a, b| a.option.abr.total_cmp(&b.option.abr))?;

    let video_size = best_video.option.filesize;
    let audio_size = best_audio.option.filesize;
    let filesize = if video_size > 0 && audio_size > 0 {
        video_size + audio_size
    } else {
        0
    };

    Some(Classified {
        option: FormatOption {
            format_id: format!("{}+{}", best_video.option.format_id, best_audio.option.format_id),
            quality: format!("{}p (Best Quality + Audio)", best_video.option.height),
            ext: "mp4".to_string(),
            filesize,
            kind: FormatKind::BestCombined,
            height: best_video.option.height,
            width: best_video.option.width,
            fps: best_video.option.fps,
            vcodec: best_video.option.vcodec.clone(),
            acodec: best_audio.option.acodec.clone(),
            abr: best_audio.option.abr,
        },
        priority: 1,
    })
}
