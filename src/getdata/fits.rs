//! Frame header access.
//!
//! Only the three keywords the ledger needs are read. Tile-compressed
//! (`.fz`) files carry an empty primary HDU with the observation keywords in
//! the first extension, so HDUs are walked until all three are found.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::GetDataError;

const BLOCK_LEN: usize = 2880;
const CARD_LEN: usize = 80;

const KEY_GROUP: &str = "GROUPID";
const KEY_EXPOSURE: &str = "EXPTIME";
const KEY_INSTRUMENT: &str = "INSTRUME";

#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    pub group_id: String,
    pub exposure_secs: f64,
    pub instrument: String,
}

pub trait FrameMetadataReader {
    fn read(&self, path: &Path) -> Result<FrameMetadata, GetDataError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FitsHeaderReader;

impl FrameMetadataReader for FitsHeaderReader {
    fn read(&self, path: &Path) -> Result<FrameMetadata, GetDataError> {
        let unavailable = |reason: String| GetDataError::MetadataUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|err| unavailable(format!("open failed: {err}")))?;
        let mut reader = BufReader::new(file);
        let mut found: HashMap<&'static str, String> = HashMap::new();

        loop {
            let Some(header) = read_header(&mut reader).map_err(unavailable)? else {
                break;
            };
            for key in [KEY_GROUP, KEY_EXPOSURE, KEY_INSTRUMENT] {
                if found.contains_key(key) {
                    continue;
                }
                if let Some(value) = header.get(key) {
                    found.insert(key, value.clone());
                }
            }
            if found.len() == 3 {
                break;
            }
            let skip = data_len(&header).map_err(unavailable)?;
            if skip > 0 {
                let offset = i64::try_from(skip)
                    .map_err(|_| unavailable(format!("data section too large: {skip} bytes")))?;
                reader
                    .seek(SeekFrom::Current(offset))
                    .map_err(|err| unavailable(format!("seek failed: {err}")))?;
            }
        }

        let take = |key: &str| {
            found
                .get(key)
                .cloned()
                .ok_or_else(|| unavailable(format!("missing {key} keyword")))
        };
        let group_id = take(KEY_GROUP)?;
        let instrument = take(KEY_INSTRUMENT)?;
        let raw_exposure = take(KEY_EXPOSURE)?;

        if group_id.is_empty() || group_id.contains(char::is_whitespace) {
            return Err(unavailable(format!(
                "{KEY_GROUP} `{group_id}` is empty or contains whitespace"
            )));
        }
        // A ledger line starting with `#` reads back as a comment.
        if group_id.starts_with('#') {
            return Err(unavailable(format!("{KEY_GROUP} `{group_id}` starts with `#`")));
        }
        let exposure_secs = parse_number(&raw_exposure)
            .ok_or_else(|| unavailable(format!("{KEY_EXPOSURE} `{raw_exposure}` is not a number")))?;
        if !exposure_secs.is_finite() || exposure_secs < 0.0 {
            return Err(unavailable(format!(
                "{KEY_EXPOSURE} `{raw_exposure}` is negative or not finite"
            )));
        }

        Ok(FrameMetadata {
            group_id,
            exposure_secs,
            instrument,
        })
    }
}

/// Read one header unit. `Ok(None)` means clean end of file before any card.
fn read_header<R: Read>(reader: &mut R) -> Result<Option<HashMap<String, String>>, String> {
    let mut cards = HashMap::new();
    let mut block = [0u8; BLOCK_LEN];
    let mut first_block = true;

    loop {
        match reader.read_exact(&mut block) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof && first_block => {
                return Ok(None);
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                return Err("header truncated before END card".to_string());
            }
            Err(err) => return Err(format!("read failed: {err}")),
        }
        first_block = false;

        for card in block.chunks(CARD_LEN) {
            let keyword = String::from_utf8_lossy(&card[..8]).trim().to_string();
            if keyword == "END" {
                return Ok(Some(cards));
            }
            if keyword.is_empty() || &card[8..10] != b"= " {
                continue;
            }
            let value = parse_value(&String::from_utf8_lossy(&card[10..]));
            cards.entry(keyword).or_insert(value);
        }
    }
}

fn parse_value(raw: &str) -> String {
    let rest = raw.trim_start();
    let Some(quoted) = rest.strip_prefix('\'') else {
        return rest.split('/').next().unwrap_or_default().trim().to_string();
    };

    let mut out = String::new();
    let mut chars = quoted.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            if chars.peek() == Some(&'\'') {
                out.push('\'');
                chars.next();
                continue;
            }
            break;
        }
        out.push(ch);
    }
    out.trim_end().to_string()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().replace(['D', 'd'], "E").parse::<f64>().ok()
}

fn header_int(header: &HashMap<String, String>, key: &str, fallback: i64) -> Result<i64, String> {
    match header.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("{key} `{raw}` is not an integer")),
        None => Ok(fallback),
    }
}

/// Size in bytes of the data section following `header`, padded to whole
/// blocks.
fn data_len(header: &HashMap<String, String>) -> Result<u64, String> {
    let naxis = header_int(header, "NAXIS", 0)?;
    if naxis <= 0 {
        return Ok(0);
    }
    let bitpix = header_int(header, "BITPIX", 8)?.unsigned_abs();
    let pcount = header_int(header, "PCOUNT", 0)?.unsigned_abs();
    let gcount = header_int(header, "GCOUNT", 1)?.unsigned_abs();

    let mut elements: u64 = 1;
    for axis in 1..=naxis {
        let len = header_int(header, &format!("NAXIS{axis}"), 0)?.unsigned_abs();
        elements = elements
            .checked_mul(len)
            .ok_or_else(|| "data section size overflows".to_string())?;
    }

    let bytes = elements
        .checked_add(pcount)
        .and_then(|n| n.checked_mul(gcount))
        .and_then(|n| n.checked_mul(bitpix / 8))
        .ok_or_else(|| "data section size overflows".to_string())?;
    let block = BLOCK_LEN as u64;
    Ok(bytes.div_ceil(block) * block)
}


#[cfg(test)]
mod tests {
    use super::testing::{card, frame_bytes, header_unit};
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reads_keywords_from_primary_header() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("frame.fits");
        fs::write(&path, frame_bytes("ogle-2016-blg-0001", "100.0", "fl03")).expect("write");

        let meta = FitsHeaderReader.read(&path).expect("metadata");
        assert_eq!(
            meta,
            FrameMetadata {
                group_id: "ogle-2016-blg-0001".to_string(),
                exposure_secs: 100.0,
                instrument: "fl03".to_string(),
            }
        );
    }

    #[test]
    fn walks_past_primary_data_into_extension() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("frame.fits.fz");

        let mut bytes = header_unit(&[
            card("SIMPLE", "T"),
            card("BITPIX", "16"),
            card("NAXIS", "2"),
            card("NAXIS1", "10"),
            card("NAXIS2", "10"),
            card("INSTRUME", "'kb71    '         / instrument"),
        ]);
        bytes.extend(std::iter::repeat_n(0u8, BLOCK_LEN));
        bytes.extend(header_unit(&[
            card("XTENSION", "'BINTABLE'"),
            card("BITPIX", "8"),
            card("NAXIS", "0"),
            card("GROUPID", "'grp''s one'"),
            card("EXPTIME", "3.0D1 / seconds"),
            card("INSTRUME", "'ignored'"),
        ]));
        fs::write(&path, bytes).expect("write");

        let err = FitsHeaderReader.read(&path).expect_err("whitespace group");
        assert!(matches!(err, GetDataError::MetadataUnavailable { .. }));

        let mut bytes = header_unit(&[
            card("SIMPLE", "T"),
            card("BITPIX", "16"),
            card("NAXIS", "2"),
            card("NAXIS1", "10"),
            card("NAXIS2", "10"),
            card("INSTRUME", "'kb71    '         / instrument"),
        ]);
        bytes.extend(std::iter::repeat_n(0u8, BLOCK_LEN));
        bytes.extend(header_unit(&[
            card("XTENSION", "'BINTABLE'"),
            card("BITPIX", "8"),
            card("NAXIS", "0"),
            card("GROUPID", "'grp''s'"),
            card("EXPTIME", "3.0D1 / seconds"),
        ]));
        fs::write(&path, bytes).expect("write");

        let meta = FitsHeaderReader.read(&path).expect("metadata");
        assert_eq!(meta.instrument, "kb71");
        assert_eq!(meta.group_id, "grp's");
        assert_eq!(meta.exposure_secs, 30.0);
    }

    #[test]
    fn missing_keyword_is_reported() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("frame.fits");
        fs::write(
            &path,
            header_unit(&[card("SIMPLE", "T"), card("EXPTIME", "10")]),
        )
        .expect("write");

        let err = FitsHeaderReader.read(&path).expect_err("missing");
        match err {
            GetDataError::MetadataUnavailable { reason, .. } => {
                assert!(reason.contains("GROUPID"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_or_missing_file_is_unavailable() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("frame.fits");
        fs::write(&path, &frame_bytes("g", "1", "fl03")[..100]).expect("write");
        assert!(FitsHeaderReader.read(&path).is_err());
        assert!(FitsHeaderReader.read(&tmp.path().join("absent.fits")).is_err());
    }

    #[test]
    fn negative_exposure_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("frame.fits");
        fs::write(&path, frame_bytes("g1", "-5", "fl03")).expect("write");
        assert!(FitsHeaderReader.read(&path).is_err());
    }

    #[test]
    fn group_id_that_would_read_as_comment_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("frame.fits");
        fs::write(&path, frame_bytes("#7", "100", "fl03")).expect("write");

        match FitsHeaderReader.read(&path).expect_err("comment-like group") {
            GetDataError::MetadataUnavailable { reason, .. } => {
                assert!(reason.contains("`#7`"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }

        fs::write(&path, frame_bytes("g#7", "100", "fl03")).expect("write");
        assert_eq!(FitsHeaderReader.read(&path).expect("inner #").group_id, "g#7");
    }
}
