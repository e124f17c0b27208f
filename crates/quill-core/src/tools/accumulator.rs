use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::tools::{FunctionCall, ToolCall, ToolCallFragment, ToolCallRequest};

#[derive(Debug, Clone)]
struct Slot {
    id: Option<String>,
    name: String,
    arguments: String,
    ready: Option<ToolCallRequest>,
}

/// Merges partial tool-call fragments into dispatchable requests.
///
/// Lives for one round. Fragments are keyed by their stream index; a call
/// becomes ready the moment its accumulated argument text parses as JSON,
/// and exactly once. Argument text that never parses is not an error, the
/// call simply stays pending (and is reported by [`finish`]).
///
/// [`finish`]: ToolCallAccumulator::finish
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<usize, Slot>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the completed request on the append
    /// that first makes the accumulated argument text well-formed.
    pub fn push(&mut self, fragment: ToolCallFragment) -> Option<ToolCallRequest> {
        let slot = self.slots.entry(fragment.index).or_insert_with(|| Slot {
            id: None,
            name: String::new(),
            arguments: String::new(),
            ready: None,
        });

        if slot.ready.is_some() {
            log::warn!(
                "tool call at index {} received a fragment after completion; ignoring",
                fragment.index
            );
            return None;
        }

        // id/name are expected on the first fragment only, but accept
        // them whenever they show up first.
        if slot.id.is_none() {
            slot.id = fragment.id.filter(|id| !id.is_empty());
        }
        if slot.name.is_empty() {
            if let Some(name) = fragment.name {
                slot.name = name;
            }
        }

        slot.arguments.push_str(&fragment.arguments);

        if slot.arguments.is_empty() {
            // Could still be the leading delta of an argument-carrying
            // call; zero-argument calls are promoted by finish().
            return None;
        }

        match serde_json::from_str::<Value>(&slot.arguments) {
            Ok(arguments) => Some(Self::promote(fragment.index, slot, arguments)),
            // Incomplete JSON, keep accumulating.
            Err(_) => None,
        }
    }

    /// Called once the fragment stream ends. Promotes calls that never
    /// received any argument text (zero-parameter tools) to ready with
    /// empty-object arguments; logs calls left with unparseable text.
    pub fn finish(&mut self) -> Vec<ToolCallRequest> {
        let mut promoted = Vec::new();
        for (index, slot) in self.slots.iter_mut() {
            if slot.ready.is_some() {
                continue;
            }
            if slot.arguments.is_empty() {
                promoted.push(Self::promote(*index, slot, Value::Object(Default::default())));
            } else {
                log::warn!(
                    "tool call '{}' at index {} ended with unparseable arguments: {}",
                    slot.name,
                    index,
                    slot.arguments
                );
            }
        }
        promoted
    }

    /// The round's ready calls in index order, in the wire shape recorded
    /// on the assistant history message.
    pub fn wire_calls(&self) -> Vec<ToolCall> {
        self.slots
            .values()
            .filter_map(|slot| slot.ready.as_ref())
            .map(|request| ToolCall {
                id: request.id.clone(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: request.name.clone(),
                    arguments: request.arguments.to_string(),
                },
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn promote(index: usize, slot: &mut Slot, arguments: Value) -> ToolCallRequest {
        let request = ToolCallRequest {
            id: slot
                .id
                .clone()
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            index,
            name: slot.name.clone(),
            arguments,
        };
        slot.id = Some(request.id.clone());
        slot.ready = Some(request.clone());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(index: usize, id: Option<&str>, name: Option<&str>, arguments: &str) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn becomes_ready_only_once_arguments_parse() {
        let mut accumulator = ToolCallAccumulator::new();

        let first = accumulator.push(fragment(0, Some("call_1"), Some("add"), "{\"a\":1,"));
        assert!(first.is_none(), "half of the JSON must stay pending");

        let second = accumulator
            .push(fragment(0, None, None, "\"b\":2}"))
            .expect("complete JSON transitions to ready");
        assert_eq!(second.id, "call_1");
        assert_eq!(second.name, "add");
        assert_eq!(second.arguments, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn rechunking_does_not_change_the_parsed_result() {
        let total = "{\"city\":\"Berlin\",\"days\":3}";
        let splits: &[&[usize]] = &[&[total.len()], &[1, total.len() - 1], &[9, 10, total.len() - 19]];

        let mut results = Vec::new();
        for split in splits {
            let mut accumulator = ToolCallAccumulator::new();
            let mut ready = Vec::new();
            let mut offset = 0;
            for (i, len) in split.iter().enumerate() {
                let piece = &total[offset..offset + len];
                offset += len;
                let frag = if i == 0 {
                    fragment(0, Some("call_w"), Some("weather"), piece)
                } else {
                    fragment(0, None, None, piece)
                };
                if let Some(request) = accumulator.push(frag) {
                    ready.push(request);
                }
            }
            assert_eq!(ready.len(), 1, "exactly one ready transition per index");
            results.push(ready.remove(0).arguments);
        }

        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn fragments_after_completion_are_ignored() {
        let mut accumulator = ToolCallAccumulator::new();
        let ready = accumulator.push(fragment(0, Some("call_1"), Some("add"), "{\"a\":1}"));
        assert!(ready.is_some());

        assert!(accumulator.push(fragment(0, None, None, "{\"a\":2}")).is_none());
        assert_eq!(accumulator.wire_calls().len(), 1);
        assert_eq!(
            accumulator.wire_calls()[0].function.arguments,
            "{\"a\":1}"
        );
    }

    #[test]
    fn zero_argument_call_is_promoted_at_finish() {
        let mut accumulator = ToolCallAccumulator::new();
        assert!(accumulator
            .push(fragment(0, Some("call_list"), Some("list_flights"), ""))
            .is_none());

        let promoted = accumulator.finish();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].name, "list_flights");
        assert_eq!(promoted[0].arguments, json!({}));

        // A second finish must not promote it again.
        assert!(accumulator.finish().is_empty());
    }

    #[test]
    fn unparseable_leftover_is_dropped_not_promoted() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.push(fragment(0, Some("call_1"), Some("add"), "{\"a\":"));
        assert!(accumulator.finish().is_empty());
        assert!(accumulator.wire_calls().is_empty());
    }

    #[test]
    fn interleaved_indices_accumulate_independently() {
        let mut accumulator = ToolCallAccumulator::new();
        assert!(accumulator
            .push(fragment(0, Some("call_a"), Some("add"), "{\"a\":"))
            .is_none());
        assert!(accumulator
            .push(fragment(1, Some("call_b"), Some("mul"), "{\"x\":"))
            .is_none());

        let ready_b = accumulator
            .push(fragment(1, None, None, "3}"))
            .expect("second call completes first");
        assert_eq!(ready_b.id, "call_b");

        let ready_a = accumulator.push(fragment(0, None, None, "1}")).expect("first call");
        assert_eq!(ready_a.id, "call_a");

        // Wire calls come back in index order regardless of readiness order.
        let wire = accumulator.wire_calls();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].id, "call_a");
        assert_eq!(wire[1].id, "call_b");
    }

    #[test]
    fn missing_call_id_is_backfilled() {
        let mut accumulator = ToolCallAccumulator::new();
        let request = accumulator
            .push(fragment(0, None, Some("ping"), "{}"))
            .expect("ready");
        assert!(request.id.starts_with("call_"));
        assert_eq!(accumulator.wire_calls()[0].id, request.id);
    }
}
