//! QR payload codec shared by the scan routes and the scoring action.
//!
//! Two client populations print different payload text for the same physical
//! markers: the mobile scanner uses the compact `GameQrcodeFach:<cor>` form and
//! the legacy web surface uses `GAME_QR_<COLOR>_<nnn>`. Everything downstream
//! (ledger de-duplication, scoring, statistics) works on [`QrColor`] and the
//! compact text only, so adding a client format means adding a [`Grammar`] row.

use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Namespace of the compact payload grammar.
pub const COMPACT_NAMESPACE: &str = "GameQrcodeFach";
/// Prefix of the legacy payload grammar.
pub const LEGACY_PREFIX: &str = "GAME_QR";

/// Marker colors and their point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QrColor {
    /// Green marker, 1 point.
    Verde,
    /// Orange marker, 3 points.
    Laranja,
    /// Red marker, 5 points.
    Vermelho,
}

impl QrColor {
    /// Every color in ascending point order.
    pub const ALL: [QrColor; 3] = [QrColor::Verde, QrColor::Laranja, QrColor::Vermelho];

    /// Points credited when a marker of this color is scanned.
    pub fn points(self) -> i32 {
        match self {
            QrColor::Verde => 1,
            QrColor::Laranja => 3,
            QrColor::Vermelho => 5,
        }
    }

    /// Token used by the compact grammar (also the canonical name).
    pub fn compact_token(self) -> &'static str {
        match self {
            QrColor::Verde => "verde",
            QrColor::Laranja => "laranja",
            QrColor::Vermelho => "vermelho",
        }
    }

    /// Token used by the legacy grammar.
    pub fn legacy_token(self) -> &'static str {
        match self {
            QrColor::Verde => "GREEN",
            QrColor::Laranja => "ORANGE",
            QrColor::Vermelho => "RED",
        }
    }

    fn from_compact_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.compact_token() == token)
    }

    fn from_legacy_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.legacy_token() == token)
    }
}

/// Payload grammars understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QrFormat {
    /// `GameQrcodeFach:<verde|laranja|vermelho>`.
    Compact,
    /// `GAME_QR_<GREEN|ORANGE|RED>_<digits>`.
    Legacy,
}

/// One row of the grammar table: how to recognise and print a format.
struct Grammar {
    format: QrFormat,
    parse: fn(&str) -> Option<QrColor>,
    render: fn(QrColor, u16) -> String,
}

const GRAMMARS: &[Grammar] = &[
    Grammar {
        format: QrFormat::Compact,
        parse: parse_compact,
        render: render_compact,
    },
    Grammar {
        format: QrFormat::Legacy,
        parse: parse_legacy,
        render: render_legacy,
    },
];

fn parse_compact(payload: &str) -> Option<QrColor> {
    let token = payload
        .strip_prefix(COMPACT_NAMESPACE)?
        .strip_prefix(':')?;
    QrColor::from_compact_token(token)
}

fn render_compact(color: QrColor, _suffix: u16) -> String {
    format!("{COMPACT_NAMESPACE}:{}", color.compact_token())
}

fn parse_legacy(payload: &str) -> Option<QrColor> {
    let rest = payload.strip_prefix(LEGACY_PREFIX)?.strip_prefix('_')?;
    let (token, suffix) = rest.split_once('_')?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    QrColor::from_legacy_token(token)
}

fn render_legacy(color: QrColor, suffix: u16) -> String {
    format!("{LEGACY_PREFIX}_{}_{suffix:03}", color.legacy_token())
}

fn grammar(format: QrFormat) -> &'static Grammar {
    GRAMMARS
        .iter()
        .find(|g| g.format == format)
        .unwrap_or(&GRAMMARS[0])
}

/// A successfully parsed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrCode {
    /// Grammar the payload was written in.
    pub format: QrFormat,
    /// Marker color.
    pub color: QrColor,
}

impl QrCode {
    /// Parse `payload` against every known grammar.
    pub fn parse(payload: &str) -> Option<Self> {
        GRAMMARS.iter().find_map(|grammar| {
            (grammar.parse)(payload).map(|color| QrCode {
                format: grammar.format,
                color,
            })
        })
    }

    /// Points credited for this code.
    pub fn points(&self) -> i32 {
        self.color.points()
    }

    /// Canonical (compact) text of this code.
    pub fn normalized(&self) -> String {
        render_compact(self.color, 0)
    }

    /// Print this code in `format`. Legacy suffixes are decorative and picked at random.
    pub fn to_format(&self, format: QrFormat) -> String {
        let suffix = rand::rng().random_range(1..=999);
        (grammar(format).render)(self.color, suffix)
    }
}

/// Result of [`validate`]; `valid == false` carries no format or color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Validation {
    /// Whether a grammar matched.
    pub valid: bool,
    /// Matching grammar.
    pub format: Option<QrFormat>,
    /// Marker color.
    pub color: Option<QrColor>,
    /// Points the marker is worth, 0 when invalid.
    pub points: i32,
}

/// Result of [`normalize`]; every field is empty for invalid input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Normalized {
    /// Compact form of the payload.
    pub normalized: Option<String>,
    /// Marker color.
    pub color: Option<QrColor>,
    /// Points the marker is worth, 0 when invalid.
    pub points: i32,
}

/// Check whether `payload` matches one of the known grammars.
pub fn validate(payload: &str) -> Validation {
    match QrCode::parse(payload) {
        Some(code) => Validation {
            valid: true,
            format: Some(code.format),
            color: Some(code.color),
            points: code.points(),
        },
        None => Validation {
            valid: false,
            format: None,
            color: None,
            points: 0,
        },
    }
}

/// Canonicalise any valid payload to the compact form.
///
/// Idempotent: normalising an already normalised payload returns it unchanged.
pub fn normalize(payload: &str) -> Normalized {
    match QrCode::parse(payload) {
        Some(code) => Normalized {
            normalized: Some(code.normalized()),
            color: Some(code.color),
            points: code.points(),
        },
        None => Normalized {
            normalized: None,
            color: None,
            points: 0,
        },
    }
}

/// The official payloads of a format, one per color.
pub fn canonical_payloads(format: QrFormat) -> Vec<String> {
    let grammar = grammar(format);
    QrColor::ALL
        .into_iter()
        .zip(1u16..)
        .map(|(color, index)| (grammar.render)(color, index))
        .collect()
}

/// Per-color scan counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ColorCounts {
    /// Green markers (1 point).
    pub verde: u32,
    /// Orange markers (3 points).
    pub laranja: u32,
    /// Red markers (5 points).
    pub vermelho: u32,
}

impl ColorCounts {
    fn bump(&mut self, color: QrColor) {
        match color {
            QrColor::Verde => self.verde += 1,
            QrColor::Laranja => self.laranja += 1,
            QrColor::Vermelho => self.vermelho += 1,
        }
    }
}

/// Per-grammar scan counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct FormatCounts {
    /// `GameQrcodeFach:<cor>` payloads.
    pub compact: u32,
    /// `GAME_QR_<COLOR>_<n>` payloads.
    pub legacy: u32,
}

/// Aggregate statistics over a list of scanned payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct QrStats {
    /// Parsable entries.
    pub total: u32,
    /// Entries per color.
    pub by_color: ColorCounts,
    /// Sum of the points of every entry.
    pub total_points: i64,
    /// Entries per grammar.
    pub formats: FormatCounts,
}

/// Fold scanned payloads into [`QrStats`]. Unparsable entries are skipped.
pub fn compute_stats<I, S>(scanned: I) -> QrStats
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    scanned
        .into_iter()
        .filter_map(|payload| QrCode::parse(payload.as_ref()))
        .fold(QrStats::default(), |mut stats, code| {
            stats.total += 1;
            stats.by_color.bump(code.color);
            stats.total_points += i64::from(code.points());
            match code.format {
                QrFormat::Compact => stats.formats.compact += 1,
                QrFormat::Legacy => stats.formats.legacy += 1,
            }
            stats
        })
}
