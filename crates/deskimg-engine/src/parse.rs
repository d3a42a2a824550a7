use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

/// Repository values that mark untagged or intermediate layers.
const UNADDRESSABLE_REPOSITORIES: &[&str] = &["", "sha256", "<none>"];

/// One image/tag pair as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "imageName")]
    pub image_name: String,
    pub tag: String,
    #[serde(rename = "imageID")]
    pub image_id: String,
    pub size: String,
}

/// Shape of one `images --format '{{json .}}'` line. Extra fields are ignored.
#[derive(Debug, Deserialize)]
struct ImagesLine {
    #[serde(rename = "Repository", default)]
    repository: String,
    #[serde(rename = "Tag", default)]
    tag: String,
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Size", default)]
    size: String,
}

/// Parse line-delimited JSON `images` output into a sorted image list.
///
/// Blank and malformed lines are skipped (malformed ones are logged); untagged
/// layers are dropped. The result order depends only on the set of records,
/// never on the input line order.
pub fn parse_images(raw: &str) -> Vec<ImageRecord> {
    let mut images: Vec<ImageRecord> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<ImagesLine>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("skipping unparsable images line [{line}]: {e}");
                None
            }
        })
        .filter(|record| !UNADDRESSABLE_REPOSITORIES.contains(&record.repository.as_str()))
        .map(|record| ImageRecord {
            image_name: record.repository,
            tag: record.tag,
            image_id: record.id,
            size: record.size,
        })
        .collect();

    images.sort_by(compare_images);
    images
}

fn compare_images(a: &ImageRecord, b: &ImageRecord) -> Ordering {
    locale_cmp(&a.image_name, &b.image_name)
        .then_with(|| locale_cmp(&a.tag, &b.tag))
        .then_with(|| locale_cmp(&a.image_id, &b.image_id))
}

/// ASCII whitespace, punctuation and symbols in root collation order. All of
/// them sort before digits, and digits before letters.
const ASCII_VARIABLE_ORDER: &str = "\t\n\u{b}\u{c}\r _-,;:!?.'\"()[]{}@*/\\&#%`^+<=>|~$";

/// Primary weight of one character: ignores case, ranks punctuation below
/// digits below letters. Characters outside ASCII follow all of these by code
/// point.
fn primary_weight(c: char) -> u32 {
    if let Some(pos) = ASCII_VARIABLE_ORDER.find(c) {
        return pos as u32;
    }
    if let Some(d) = c.to_digit(10) {
        return 0x100 + d;
    }
    if c.is_ascii_alphabetic() {
        return 0x200 + u32::from(c.to_ascii_lowercase()) - u32::from(b'a');
    }
    let folded = c.to_lowercase().next().unwrap_or(c);
    0x1000 + u32::from(folded)
}

/// Locale-style string collation: primary weights first, then lowercase
/// before uppercase on case-only differences, then code point so the
/// ordering is total.
fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .map(primary_weight)
        .cmp(b.chars().map(primary_weight))
        .then_with(|| {
            a.chars()
                .map(|c| (c.is_uppercase(), c))
                .cmp(b.chars().map(|c| (c.is_uppercase(), c)))
        })
}
