//! Device message dictionaries.
//!
//! # Keys
//!
//! | Key | Name        | Direction      | Value                              |
//! |-----|-------------|----------------|------------------------------------|
//! | 0   | `SifterName`| device display | name of the sifter being shown     |
//! | 1   | `SiftedText`| device display | text produced by running the rule  |
//! | 2   | `FullName`  | host → device  | display title                      |
//! | 2   | `FullName`  | device → host  | selection token echoed back        |
//! | 3   | `Handshake` | device → host  | `1` once the device app is ready   |
//! | 4   | `MenuName`  | host → device  | selection token (the sifter id)    |
//! | 5   | `Rule`      | host → device  | rule definition, verbatim          |
//!
//! Keys 0 and 1 drive the device's own display layers. This host never writes
//! them, since it does not evaluate rules, and ignores them on inbound
//! dictionaries.
//!
//! Dictionaries serialize as JSON objects with stringified integer keys,
//! e.g. `{"3":1}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sifter_core::{Sifter, SifterId};

use crate::error::SyncError;

/// Dictionary keys understood by the companion app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKey {
    SifterName = 0x0,
    SiftedText = 0x1,
    FullName = 0x2,
    Handshake = 0x3,
    MenuName = 0x4,
    Rule = 0x5,
}

impl MessageKey {
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// A single dictionary value: the device only knows integers and C strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TupleValue {
    Int(i64),
    CString(String),
}

pub type Dictionary = BTreeMap<u32, TupleValue>;

/// Parse an inbound dictionary from its JSON form.
pub fn parse_dictionary(json: &str) -> Result<Dictionary, SyncError> {
    Ok(serde_json::from_str(json)?)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Titles longer than this many characters are cut.
    pub title_max_chars: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { title_max_chars: 32 }
    }
}

/// One sifter, encoded for the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub sifter_id: SifterId,
    pub dict: Dictionary,
}

impl OutboundMessage {
    pub fn get(&self, key: MessageKey) -> Option<&TupleValue> {
        self.dict.get(&key.code())
    }
}

pub fn encode(sifter: &Sifter, options: &EncodeOptions) -> OutboundMessage {
    let mut dict = Dictionary::new();
    dict.insert(
        MessageKey::FullName.code(),
        TupleValue::CString(truncate_title(&sifter.name.0, options.title_max_chars)),
    );
    dict.insert(
        MessageKey::MenuName.code(),
        TupleValue::CString(sifter.id.to_string()),
    );
    dict.insert(MessageKey::Rule.code(), TupleValue::CString(sifter.rule.clone()));
    OutboundMessage {
        sifter_id: sifter.id,
        dict,
    }
}

/// Cut `title` to at most `max_chars` characters on a char boundary.
pub fn truncate_title(title: &str, max_chars: usize) -> String {
    match title.char_indices().nth(max_chars) {
        Some((byte_index, _)) => title[..byte_index].to_string(),
        None => title.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Classified transport notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Ordinary application resume; never triggers a sync.
    Resume,
    /// The device is connected and ready for sifters.
    Handshake,
    /// The device picked a sifter from its menu.
    Select { token: String },
}

impl Notification {
    /// Handshake wins over selection; anything unrecognised is a resume.
    pub fn classify(dict: &Dictionary) -> Self {
        match dict.get(&MessageKey::Handshake.code()) {
            Some(TupleValue::Int(flag)) if *flag != 0 => return Notification::Handshake,
            _ => {}
        }
        match dict.get(&MessageKey::FullName.code()) {
            Some(TupleValue::CString(token)) if !token.is_empty() => Notification::Select {
                token: token.clone(),
            },
            _ => Notification::Resume,
        }
    }
}
