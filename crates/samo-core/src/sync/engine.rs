//! Cache synchronization
//!
//! Frames are handled strictly in arrival order; the transport must deliver
//! them reliably and in order, otherwise a patch can land on the wrong base
//! state.

use serde_json::Value;
use tracing::debug;

use super::handler::Update;
use crate::cache::Cache;
use crate::codec::{self, Envelope};
use crate::endpoint::Channel;
use crate::error::ProtocolError;

pub(crate) struct SyncEngine {
    channel: Channel,
    cache: Option<Cache>,
}

impl SyncEngine {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            cache: None,
        }
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Interpret one inbound frame.
    ///
    /// On error the cache is left exactly as it was.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<Update, ProtocolError> {
        let mode = match &self.channel {
            Channel::Time => return codec::parse_time(frame).map(Update::Time),
            Channel::Data(mode) => mode,
        };

        let envelope = Envelope::from_slice(frame)?;
        if envelope.snapshot {
            let cache = codec::decode(&envelope, mode)?;
            debug!("Snapshot with {} entries", cache.entries().len());
            self.cache = Some(cache.clone());
            return Ok(Update::Cache(cache));
        }

        let current = self.cache.as_ref().ok_or(ProtocolError::NoSnapshot)?;
        let ops = codec::decode_patch(&envelope, current)?;
        let next = current.apply(&ops)?;
        debug!("Applied patch batch of {} ops", ops.len());
        self.cache = Some(next.clone());
        Ok(Update::Cache(next))
    }

    pub fn set_frame(&self, data: &Value, index: Option<&str>) -> Result<String, ProtocolError> {
        codec::set_frame(data, index)
    }

    pub fn del_frame(&self, index: &str) -> Result<String, ProtocolError> {
        codec::del_frame(index)
    }

    /// Forget the cache; the next snapshot starts over
    pub fn discard(&mut self) {
        self.cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Entry;
    use crate::codec::encode_value;
    use crate::endpoint::Mode;
    use serde_json::json;

    fn frame(payload: &Value, snapshot: bool) -> Vec<u8> {
        let mut envelope = codec::encode(payload, None).unwrap();
        envelope.snapshot = snapshot;
        serde_json::to_vec(&envelope).unwrap()
    }

    fn wire_entry(index: &str, created: i64, updated: i64, data: &Value) -> Value {
        json!({
            "index": index,
            "created": created,
            "updated": updated,
            "data": encode_value(data).unwrap(),
        })
    }

    fn empty_snapshot() -> Vec<u8> {
        br#"{"data":"","snapshot":true}"#.to_vec()
    }

    #[test]
    fn test_time_channel_bypasses_cache() {
        let mut engine = SyncEngine::new(Channel::Time);
        let update = engine.handle_frame(br#"{"data":"1700000000"}"#).unwrap();
        assert_eq!(update, Update::Time(1_700_000_000));
        assert!(engine.cache().is_none());
    }

    #[test]
    fn test_patch_before_snapshot_rejected() {
        let mut engine = SyncEngine::new(Channel::Data(Mode::Singular));
        let result = engine.handle_frame(&frame(&json!([]), false));
        assert!(matches!(result, Err(ProtocolError::NoSnapshot)));
    }

    #[test]
    fn test_singular_lifecycle() {
        let mut engine = SyncEngine::new(Channel::Data(Mode::Singular));
        let box_data = json!({"name": "a box"});
        let still = json!({"name": "still a box"});

        // read: empty
        let update = engine.handle_frame(&empty_snapshot()).unwrap();
        assert_eq!(update, Update::Cache(Cache::Entry(Entry::default())));

        // create
        let update = engine
            .handle_frame(&frame(
                &json!([
                    {"op": "replace", "path": "/created", "value": 100},
                    {"op": "replace", "path": "/index", "value": "box"},
                    {"op": "replace", "path": "/data", "value": encode_value(&box_data).unwrap()}
                ]),
                false,
            ))
            .unwrap();
        let entry = update.as_cache().unwrap().as_entry().unwrap().clone();
        assert!(entry.created > 0);
        assert_eq!(entry.updated, 0);
        assert_eq!(entry.index, "box");
        assert_eq!(entry.data, box_data);

        // update
        let update = engine
            .handle_frame(&frame(
                &json!([
                    {"op": "replace", "path": "/updated", "value": 200},
                    {"op": "replace", "path": "/data", "value": encode_value(&still).unwrap()}
                ]),
                false,
            ))
            .unwrap();
        let entry = update.as_cache().unwrap().as_entry().unwrap();
        assert!(entry.updated > 0);
        assert_eq!(entry.data, still);

        // delete: server resends the empty entry
        let update = engine
            .handle_frame(&frame(
                &json!([
                    {"op": "replace", "path": "", "value": wire_entry("", 0, 0, &json!({}))}
                ]),
                false,
            ))
            .unwrap();
        assert_eq!(update, Update::Cache(Cache::Entry(Entry::default())));
    }

    #[test]
    fn test_collection_lifecycle() {
        let mut engine = SyncEngine::new(Channel::Data(Mode::Collection));
        let mut lengths = Vec::new();

        let batches = [
            json!([{"op": "add", "path": "/0", "value": wire_entry("1", 10, 0, &json!({"name": "something"}))}]),
            json!([
                {"op": "replace", "path": "/0/updated", "value": 20},
                {"op": "replace", "path": "/0/data", "value": encode_value(&json!({"name": "still something"})).unwrap()}
            ]),
            json!([{"op": "remove", "path": "/0"}]),
        ];

        let update = engine.handle_frame(&empty_snapshot()).unwrap();
        lengths.push(update.as_cache().unwrap().entries().len());
        for batch in &batches {
            let update = engine.handle_frame(&frame(batch, false)).unwrap();
            let cache = update.as_cache().unwrap();
            if let Some(entry) = cache.entries().first() {
                assert!(entry.created > 0);
            }
            lengths.push(cache.entries().len());
        }

        assert_eq!(lengths, vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_collection_three_records() {
        let mut engine = SyncEngine::new(Channel::Data(Mode::Collection));
        let indexes = |update: &Update| -> Vec<String> {
            update
                .as_cache()
                .unwrap()
                .entries()
                .iter()
                .map(|e| e.index.clone())
                .collect()
        };

        let update = engine.handle_frame(&empty_snapshot()).unwrap();
        assert!(indexes(&update).is_empty());

        // create
        for (n, index) in ["1", "2", "3"].into_iter().enumerate() {
            let created = 10 * (n as i64 + 1);
            let data = json!({"name": format!("something {}", index)});
            let batch = json!([{"op": "add", "path": "/-", "value": wire_entry(index, created, 0, &data)}]);
            let update = engine.handle_frame(&frame(&batch, false)).unwrap();
            assert_eq!(indexes(&update).len(), n + 1);
        }
        let cache = engine.cache().unwrap();
        assert_eq!(cache.get("2").unwrap().data, json!({"name": "something 2"}));

        // update every record in place
        for position in 0..3 {
            let batch = json!([
                {"op": "replace", "path": format!("/{}/updated", position), "value": 100},
                {"op": "replace", "path": format!("/{}/data", position), "value": encode_value(&json!({"name": "still"})).unwrap()}
            ]);
            let update = engine.handle_frame(&frame(&batch, false)).unwrap();
            assert_eq!(indexes(&update), vec!["1", "2", "3"]);
        }
        for entry in engine.cache().unwrap().entries() {
            assert!(entry.created > 0);
            assert!(entry.updated > 0);
            assert_eq!(entry.data, json!({"name": "still"}));
        }

        // a second record under a live index is refused
        let duplicate = json!([{"op": "add", "path": "/-", "value": wire_entry("2", 50, 0, &json!({}))}]);
        assert!(matches!(
            engine.handle_frame(&frame(&duplicate, false)),
            Err(ProtocolError::Invariant(_))
        ));
        assert_eq!(engine.cache().unwrap().entries().len(), 3);

        // delete
        let mut remaining = Vec::new();
        for _ in 0..3 {
            let batch = json!([{"op": "remove", "path": "/0"}]);
            let update = engine.handle_frame(&frame(&batch, false)).unwrap();
            remaining.push(indexes(&update));
        }
        assert_eq!(
            remaining,
            vec![vec!["2", "3"], vec!["3"], Vec::<&str>::new()]
        );
    }

    #[test]
    fn test_failed_batch_keeps_cache() {
        let mut engine = SyncEngine::new(Channel::Data(Mode::Collection));
        let snapshot = json!([wire_entry("a", 1, 0, &json!({"n": 1}))]);
        engine.handle_frame(&frame(&snapshot, true)).unwrap();
        let before = engine.cache().cloned();

        // Second op fails; the first must not stick
        let result = engine.handle_frame(&frame(
            &json!([
                {"op": "replace", "path": "/0/data", "value": encode_value(&json!({"n": 2})).unwrap()},
                {"op": "remove", "path": "/5"}
            ]),
            false,
        ));
        assert!(matches!(result, Err(ProtocolError::Patch(_))));
        assert_eq!(engine.cache().cloned(), before);

        let garbage = engine.handle_frame(b"not json");
        assert!(matches!(garbage, Err(ProtocolError::Json(_))));
        assert_eq!(engine.cache().cloned(), before);
    }

    #[test]
    fn test_snapshot_replaces_and_discard_clears() {
        let mut engine = SyncEngine::new(Channel::Data(Mode::Collection));
        engine
            .handle_frame(&frame(&json!([wire_entry("a", 1, 0, &json!({}))]), true))
            .unwrap();
        engine
            .handle_frame(&frame(&json!([wire_entry("b", 2, 0, &json!({}))]), true))
            .unwrap();
        let cache = engine.cache().unwrap();
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        engine.discard();
        assert!(engine.cache().is_none());
    }
}
