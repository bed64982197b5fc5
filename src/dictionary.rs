//! Signal dictionary adapter
//!
//! Wraps a DBC database (parsed by the `can-dbc` crate) behind id-based
//! message lookup. The same small set of CAN ids recurs at very high
//! frequency on a bus, so converted descriptors are cached - including
//! negative results, since unrecognized traffic is a frequent, expected
//! condition and must stay cheap. The cache is capped with full-clear
//! eviction on overflow.

use crate::types::{IngestError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Extended-frame flag carried in bit 31 of DBC message ids
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Default cache entries before a full clear
pub const DEFAULT_CACHE_LIMIT: usize = 1000;

/// A CAN message descriptor converted from the DBC
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    /// CAN arbitration id (extended flag stripped)
    pub id: u32,
    /// Message name
    pub name: String,
    /// Declared message size in bytes
    pub size: usize,
    /// All signals in this message
    pub signals: Vec<SignalSpec>,
}

impl MessageDescriptor {
    /// Look up a signal definition by name within this message
    pub fn signal(&self, name: &str) -> Option<&SignalSpec> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// A CAN signal definition converted from the DBC
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    /// Byte order for bit extraction
    pub byte_order: ByteOrder,
    /// Signedness of the raw value
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Engineering unit, if the DBC records one
    pub unit: Option<String>,
    /// Value table for enumerated signals (raw value -> symbolic name)
    pub choices: Option<HashMap<i64, String>>,
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// Lookup cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryCacheStats {
    /// Cached lookups, negative results included
    pub entries: usize,
    /// Entries before the cache is cleared
    pub limit: usize,
}

/// The signal dictionary: DBC database plus a bounded lookup cache
pub struct SignalDictionary {
    dbc: can_dbc::DBC,
    cache: Mutex<HashMap<u32, Option<Arc<MessageDescriptor>>>>,
    cache_limit: usize,
}

impl SignalDictionary {
    /// Load a dictionary from a DBC file
    ///
    /// Non-UTF-8 files fall back to Latin-1, which DBC exports from Windows
    /// tools commonly use.
    pub fn from_dbc_file(path: &Path) -> Result<Self> {
        log::info!("Loading DBC file: {:?}", path);

        let bytes = std::fs::read(path).map_err(|e| {
            IngestError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
        })?;

        let content = match String::from_utf8(bytes.clone()) {
            Ok(s) => s,
            Err(_) => {
                log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
                bytes.iter().map(|&b| b as char).collect()
            }
        };

        Self::from_dbc_str(&content)
    }

    /// Load a dictionary from DBC text
    pub fn from_dbc_str(content: &str) -> Result<Self> {
        Self::with_cache_limit(content, DEFAULT_CACHE_LIMIT)
    }

    /// Load a dictionary with a custom lookup-cache limit
    pub fn with_cache_limit(content: &str, cache_limit: usize) -> Result<Self> {
        let dbc = can_dbc::DBC::from_slice(content.as_bytes())
            .map_err(|e| IngestError::DbcParseError(format!("{:?}", e)))?;

        log::info!("Parsed DBC with {} messages", dbc.messages().len());

        Ok(Self {
            dbc,
            cache: Mutex::new(HashMap::new()),
            cache_limit: cache_limit.max(1),
        })
    }

    /// Look up a message descriptor by CAN id
    ///
    /// `None` for an unknown id is an expected, frequent condition - the
    /// caller skips the frame, never the batch. Both hits and misses are
    /// cached.
    pub fn lookup_message(&self, can_id: u32) -> Option<Arc<MessageDescriptor>> {
        let key = can_id & EXTENDED_ID_MASK;

        // A poisoned lock only means another thread panicked mid-insert;
        // the cache contents are still usable.
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }

        let descriptor = self
            .dbc
            .messages()
            .iter()
            .find(|m| (m.message_id().0 & EXTENDED_ID_MASK) == key)
            .map(|m| Arc::new(self.convert_message(m)));

        if descriptor.is_none() {
            log::debug!("Unknown CAN ID 0x{:X} in DBC", key);
        }

        if cache.len() >= self.cache_limit {
            log::info!(
                "Message cache size ({}) exceeded limit, clearing cache",
                cache.len()
            );
            cache.clear();
        }
        cache.insert(key, descriptor.clone());
        descriptor
    }

    /// Number of messages defined in the loaded DBC
    pub fn message_count(&self) -> usize {
        self.dbc.messages().len()
    }

    /// Current lookup-cache statistics
    pub fn cache_stats(&self) -> DictionaryCacheStats {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        DictionaryCacheStats {
            entries: cache.len(),
            limit: self.cache_limit,
        }
    }

    /// Convert a can-dbc message into an owned descriptor
    fn convert_message(&self, msg: &can_dbc::Message) -> MessageDescriptor {
        let signals = msg
            .signals()
            .iter()
            .map(|s| self.convert_signal(msg, s))
            .collect();

        MessageDescriptor {
            id: msg.message_id().0 & EXTENDED_ID_MASK,
            name: msg.message_name().to_string(),
            size: *msg.message_size() as usize,
            signals,
        }
    }

    /// Convert a can-dbc signal into an owned definition
    fn convert_signal(&self, msg: &can_dbc::Message, sig: &can_dbc::Signal) -> SignalSpec {
        let byte_order = match *sig.byte_order() {
            can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
            can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
        };

        let value_type = match *sig.value_type() {
            can_dbc::ValueType::Signed => ValueType::Signed,
            can_dbc::ValueType::Unsigned => ValueType::Unsigned,
        };

        let choices = self
            .dbc
            .value_descriptions_for_signal(*msg.message_id(), sig.name())
            .map(|descriptions| {
                descriptions
                    .iter()
                    .map(|d| (*d.a() as i64, d.b().clone()))
                    .collect::<HashMap<i64, String>>()
            })
            .filter(|table| !table.is_empty());

        SignalSpec {
            name: sig.name().to_string(),
            start_bit: *sig.start_bit() as u16,
            length: *sig.signal_size() as u16,
            byte_order,
            value_type,
            factor: *sig.factor(),
            offset: *sig.offset(),
            unit: if sig.unit().is_empty() {
                None
            } else {
                Some(sig.unit().to_string())
            },
            choices,
        }
    }
}
