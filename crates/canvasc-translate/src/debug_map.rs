//! Emitted-line to graph-node correspondence for the interpreted target.
//!
//! A [`DebugMapBuilder`] is filled while the Lua translator writes lines and
//! is frozen into an immutable [`DebugSymbolMap`] when translation finishes.
//! Each translator run owns its own builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use canvasc_core::{NodeId, SlotId};

/// Graph origin of an emitted line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSymbol {
    pub node: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotId>,
    /// Name of the enclosing graph function.
    pub function: String,
}

/// Mutable map used during translation.
#[derive(Debug, Default)]
pub struct DebugMapBuilder {
    entries: BTreeMap<u32, DebugSymbol>,
}

impl DebugMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the origin of `line` (1-based). The first record for a line wins.
    pub fn record(&mut self, line: u32, symbol: DebugSymbol) {
        self.entries.entry(line).or_insert(symbol);
    }

    pub fn finish(self) -> DebugSymbolMap {
        DebugSymbolMap {
            entries: self.entries,
        }
    }
}

/// Frozen line map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSymbolMap {
    entries: BTreeMap<u32, DebugSymbol>,
}

impl DebugSymbolMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, line: u32) -> Option<&DebugSymbol> {
        self.entries.get(&line)
    }

    /// Symbol recorded for `line`, or for the closest recorded line before it.
    pub fn lookup(&self, line: u32) -> Option<&DebugSymbol> {
        self.entries.range(..=line).next_back().map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &DebugSymbol)> {
        self.entries.iter().map(|(line, s)| (*line, s))
    }

    /// Finds the line reported in a VM error message for `chunk` and maps it
    /// back to its symbol.
    ///
    /// The VM reports positions as `<chunk>:<line>:` or as
    /// `[string "<chunk>"]:<line>:`. The chunk name must start at a token
    /// boundary and be followed directly by the line, so a name occurring
    /// inside other words or positions from other chunks never match.
    pub fn resolve_message(&self, chunk: &str, message: &str) -> Option<(u32, &DebugSymbol)> {
        let chunk = chunk.trim_start_matches(['=', '@']);
        if chunk.is_empty() {
            return None;
        }
        let line = message.match_indices(chunk).find_map(|(start, _)| {
            let preceded_by_word = message[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.');
            if preceded_by_word {
                return None;
            }
            let rest = &message[start + chunk.len()..];
            leading_line_number(rest.strip_prefix("\"]").unwrap_or(rest))
        })?;
        self.lookup(line).map(|s| (line, s))
    }
}

/// Parses a `:<digits>:` prefix.
fn leading_line_number(text: &str) -> Option<u32> {
    let rest = text.strip_prefix(':')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || rest.as_bytes().get(digits) != Some(&b':') {
        return None;
    }
    rest[..digits].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(node: u32) -> DebugSymbol {
        DebugSymbol {
            node: NodeId(node),
            slot: None,
            function: "Start".into(),
        }
    }

    fn sample() -> DebugSymbolMap {
        let mut builder = DebugMapBuilder::new();
        builder.record(4, symbol(10));
        builder.record(7, symbol(11));
        builder.record(7, symbol(99));
        builder.finish()
    }

    #[test]
    fn first_record_wins() {
        assert_eq!(sample().get(7).unwrap().node, NodeId(11));
    }

    #[test]
    fn lookup_uses_nearest_preceding_line() {
        let map = sample();
        assert!(map.lookup(3).is_none());
        assert_eq!(map.lookup(5).unwrap().node, NodeId(10));
        assert_eq!(map.lookup(100).unwrap().node, NodeId(11));
    }

    #[test]
    fn resolves_vm_messages() {
        let map = sample();
        let (line, sym) = map
            .resolve_message("=Door", "Door:7: attempt to index a nil value")
            .unwrap();
        assert_eq!(line, 7);
        assert_eq!(sym.node, NodeId(11));

        let (line, _) = map
            .resolve_message("Door", "runtime error: [string \"Door\"]:5: boom")
            .unwrap();
        assert_eq!(line, 5);

        assert!(map.resolve_message("Door", "no position here").is_none());
        assert!(map.resolve_message("Other", "Door:7: x").is_none());
    }

    #[test]
    fn positions_from_other_chunks_are_ignored() {
        let map = sample();
        let nested = "runtime error: out 'Done' handler failed: h:7: boom";
        assert!(map.resolve_message("=e", nested).is_none());
        assert!(map.resolve_message("=Door", "BigDoor:7: x").is_none());
        assert!(map.resolve_message("=Door", "Door.lua:7: x").is_none());

        let (line, _) = map
            .resolve_message("=e", "e:4: out 'Done' handler failed: h:7: boom")
            .unwrap();
        assert_eq!(line, 4);
    }

    #[test]
    fn serde_roundtrip() {
        let map = sample();
        let json = serde_json::to_string(&map).unwrap();
        let back: DebugSymbolMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
