//! HLS playlist parsing.
//!
//! Only what the preview lifecycle needs: the renditions ("levels") a master
//! playlist advertises, and the clip length of a media playlist so the
//! playback clock knows when the preview loops.

use marquee_common::StreamLevel;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Lists renditions via `#EXT-X-STREAM-INF`.
    Master,
    /// Lists segments via `#EXTINF`.
    Media,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub kind: ManifestKind,
    pub levels: Vec<StreamLevel>,
    /// Sum of segment durations (media playlists only).
    pub duration: Option<Duration>,
    /// `#EXT-X-ENDLIST` present.
    pub ended: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum ManifestError {
    #[error("missing #EXTM3U header")]
    MissingHeader,
    #[error("playlist has no renditions or segments")]
    Empty,
    #[error("#EXT-X-STREAM-INF without a URI line")]
    DanglingStreamInf,
    #[error("invalid {tag} value: {value}")]
    InvalidValue { tag: &'static str, value: String },
}

/// Parse a playlist fetched from `base_url`.
///
/// Relative rendition URIs are resolved against `base_url`.
pub fn parse_manifest(base_url: &str, text: &str) -> Result<Manifest, ManifestError> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());

    if lines.next() != Some("#EXTM3U") {
        return Err(ManifestError::MissingHeader);
    }

    let base = Url::parse(base_url).ok();
    let mut levels = Vec::new();
    let mut pending_inf: Option<StreamLevel> = None;
    let mut total_secs = 0.0f64;
    let mut segments = 0usize;
    let mut ended = false;

    for line in lines {
        if let Some(attrs) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            if pending_inf.is_some() {
                return Err(ManifestError::DanglingStreamInf);
            }
            pending_inf = Some(parse_stream_inf(attrs)?);
        } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let value = rest.split(',').next().unwrap_or_default().trim();
            let secs = value
                .parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .ok_or_else(|| extinf_error(value))?;
            total_secs += secs;
            segments += 1;
        } else if line == "#EXT-X-ENDLIST" {
            ended = true;
        } else if line.starts_with('#') {
            continue;
        } else if let Some(mut level) = pending_inf.take() {
            level.uri = resolve_uri(base.as_ref(), line);
            levels.push(level);
        }
    }

    if pending_inf.is_some() {
        return Err(ManifestError::DanglingStreamInf);
    }

    if !levels.is_empty() {
        return Ok(Manifest {
            kind: ManifestKind::Master,
            levels,
            duration: None,
            ended,
        });
    }

    if segments == 0 {
        return Err(ManifestError::Empty);
    }

    Ok(Manifest {
        kind: ManifestKind::Media,
        levels: vec![StreamLevel::single(base_url)],
        duration: Some(
            Duration::try_from_secs_f64(total_secs)
                .map_err(|_| extinf_error(&total_secs.to_string()))?,
        ),
        ended,
    })
}

fn extinf_error(value: &str) -> ManifestError {
    ManifestError::InvalidValue {
        tag: "EXTINF",
        value: value.to_string(),
    }
}

fn parse_stream_inf(attrs: &str) -> Result<StreamLevel, ManifestError> {
    let mut level = StreamLevel::single(String::new());

    for (key, value) in split_attributes(attrs) {
        match key {
            "BANDWIDTH" => {
                level.bandwidth =
                    Some(value.parse().map_err(|_| ManifestError::InvalidValue {
                        tag: "BANDWIDTH",
                        value: value.to_string(),
                    })?);
            }
            "RESOLUTION" => {
                let (w, h): (u32, u32) = value
                    .split_once('x')
                    .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
                    .ok_or_else(|| ManifestError::InvalidValue {
                        tag: "RESOLUTION",
                        value: value.to_string(),
                    })?;
                level.width = Some(w);
                level.height = Some(h);
            }
            "CODECS" => level.codecs = Some(value.to_string()),
            _ => {}
        }
    }

    Ok(level)
}

/// Split `KEY=VALUE,KEY="A,B"` pairs, honouring quotes.
fn split_attributes(attrs: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    let mut start = 0;
    let mut quoted = false;

    for (i, c) in attrs.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                pairs.extend(split_pair(&attrs[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    pairs.extend(split_pair(&attrs[start..]));
    pairs
}

fn split_pair(raw: &str) -> Option<(&str, &str)> {
    let (key, value) = raw.split_once('=')?;
    Some((key.trim(), value.trim().trim_matches('"')))
}

fn resolve_uri(base: Option<&Url>, uri: &str) -> String {
    base.and_then(|base| base.join(uri).ok())
        .map(String::from)
        .unwrap_or_else(|| uri.to_string())
}
