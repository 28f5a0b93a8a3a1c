//! FITS header card parsing, typed keyword lookup, and serialization.

use core::str;

use crate::block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE, HEADER_PAD_BYTE};
use crate::error::{Error, Result};
use crate::value::{format_value, parse_value, Value};

// ── Types ──

/// A parsed FITS header card (one 80-byte keyword record).
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    /// The 8-byte keyword name, ASCII, left-justified, space-padded.
    pub keyword: [u8; 8],
    /// The parsed value, if this card has a value indicator (`= ` in bytes 8..10).
    pub value: Option<Value>,
    /// An optional comment string.
    pub comment: Option<String>,
}

impl Card {
    /// Build a valued card. Keywords longer than eight bytes are truncated.
    pub fn new(keyword: &str, value: Value) -> Self {
        let mut kw = [b' '; 8];
        let bytes = keyword.as_bytes();
        let len = bytes.len().min(8);
        kw[..len].copy_from_slice(&bytes[..len]);
        Card {
            keyword: kw,
            value: Some(value),
            comment: None,
        }
    }

    /// Return the keyword as a trimmed UTF-8 string.
    pub fn keyword_str(&self) -> &str {
        let end = self
            .keyword
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        str::from_utf8(&self.keyword[..end]).unwrap_or("")
    }

    /// Returns `true` if this card is the END keyword.
    pub fn is_end(&self) -> bool {
        &self.keyword == b"END     "
    }
}

// ── Parsing ──

const COMMENTARY_KEYWORDS: [&[u8; 8]; 3] = [b"COMMENT ", b"HISTORY ", b"        "];

fn text_comment(bytes: &[u8]) -> Result<Option<String>> {
    let text = str::from_utf8(bytes)
        .map_err(|_| Error::InvalidHeader("card is not ASCII"))?
        .trim_end();
    Ok((!text.is_empty()).then(|| String::from(text)))
}

/// Parse a single 80-byte FITS header card.
pub fn parse_card(card_bytes: &[u8; CARD_SIZE]) -> Result<Card> {
    let mut keyword = [b' '; 8];
    keyword.copy_from_slice(&card_bytes[..8]);

    if !keyword
        .iter()
        .all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b' ' | b'-' | b'_'))
    {
        return Err(Error::InvalidKeyword);
    }

    if &keyword == b"END     " {
        return Ok(Card {
            keyword,
            value: None,
            comment: None,
        });
    }

    let has_value = card_bytes[8] == b'=' && card_bytes[9] == b' ';
    if COMMENTARY_KEYWORDS.contains(&&keyword) || !has_value {
        return Ok(Card {
            keyword,
            value: None,
            comment: text_comment(&card_bytes[8..])?,
        });
    }

    let value_field = &card_bytes[10..];
    let (value, comment) = match parse_value(value_field) {
        Some((val, comment)) => (Some(val), comment.map(String::from)),
        None => (None, None),
    };
    Ok(Card {
        keyword,
        value,
        comment,
    })
}

/// The cards of one HDU header, accumulated block by block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
    complete: bool,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse consecutive 2880-byte blocks from `data` until the END card.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut header = Header::new();
        for block in data.chunks_exact(BLOCK_SIZE) {
            let block: &[u8; BLOCK_SIZE] = block
                .try_into()
                .map_err(|_| Error::InvalidHeader("partial block"))?;
            if header.push_block(block)? {
                return Ok(header);
            }
        }
        Err(Error::InvalidHeader("no END card"))
    }

    /// Append the cards of one header block.
    ///
    /// Returns `true` once the END card has been seen; blocks pushed after
    /// that are ignored.
    pub fn push_block(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<bool> {
        if self.complete {
            return Ok(true);
        }
        for card_bytes in block.chunks_exact(CARD_SIZE) {
            let card_bytes: &[u8; CARD_SIZE] = card_bytes
                .try_into()
                .map_err(|_| Error::InvalidHeader("partial card"))?;
            let card = parse_card(card_bytes)?;
            if card.is_end() {
                self.complete = true;
                return Ok(true);
            }
            self.cards.push(card);
        }
        Ok(false)
    }

    /// Number of 2880-byte blocks this header occupied on disk.
    pub fn block_count(&self) -> usize {
        (self.cards.len() + 1).div_ceil(CARDS_PER_BLOCK)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// First value recorded for `keyword`.
    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.cards
            .iter()
            .find(|c| c.keyword_str() == keyword)
            .and_then(|c| c.value.as_ref())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    fn typed<T>(&self, keyword: &str, f: impl Fn(&Value) -> Option<T>) -> Result<Option<T>> {
        match self.get(keyword) {
            None => Ok(None),
            Some(v) => f(v)
                .map(Some)
                .ok_or_else(|| Error::InvalidValue(keyword.to_string())),
        }
    }

    fn required<T>(&self, keyword: &str, value: Result<Option<T>>) -> Result<T> {
        value?.ok_or_else(|| Error::MissingKeyword(keyword.to_string()))
    }

    pub fn opt_int(&self, keyword: &str) -> Result<Option<i64>> {
        self.typed(keyword, Value::as_i64)
    }

    pub fn int(&self, keyword: &str) -> Result<i64> {
        self.required(keyword, self.opt_int(keyword))
    }

    /// Integers are accepted wherever a float is expected.
    pub fn opt_double(&self, keyword: &str) -> Result<Option<f64>> {
        self.typed(keyword, Value::as_f64)
    }

    pub fn double(&self, keyword: &str) -> Result<f64> {
        self.required(keyword, self.opt_double(keyword))
    }

    pub fn opt_string(&self, keyword: &str) -> Result<Option<String>> {
        self.typed(keyword, |v| v.as_str().map(String::from))
    }

    pub fn string(&self, keyword: &str) -> Result<String> {
        self.required(keyword, self.opt_string(keyword))
    }

    pub fn opt_logical(&self, keyword: &str) -> Result<Option<bool>> {
        self.typed(keyword, Value::as_bool)
    }
}

// ── Writing ──

/// Serialize a [`Card`] into an 80-byte FITS card image. Comments are not
/// written.
pub fn format_card(card: &Card) -> [u8; CARD_SIZE] {
    let mut buf = [b' '; CARD_SIZE];
    buf[..8].copy_from_slice(&card.keyword);
    if let Some(ref value) = card.value {
        buf[8] = b'=';
        buf[9] = b' ';
        buf[10..].copy_from_slice(&format_value(value));
    }
    buf
}

/// Serialize header cards into complete FITS header blocks.
///
/// Appends the END card and pads the final block with blanks. The returned
/// length is always a multiple of [`BLOCK_SIZE`].
pub fn serialize_header(cards: &[Card]) -> Vec<u8> {
    let total_blocks = (cards.len() + 1).div_ceil(CARDS_PER_BLOCK);
    let mut buf = vec![HEADER_PAD_BYTE; total_blocks * BLOCK_SIZE];

    for (i, card) in cards.iter().enumerate() {
        let offset = i * CARD_SIZE;
        buf[offset..offset + CARD_SIZE].copy_from_slice(&format_card(card));
    }

    let end = cards.len() * CARD_SIZE;
    buf[end..end + 3].copy_from_slice(b"END");
    buf
}
