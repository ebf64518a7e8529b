//! Validating and applying operations
//!
//! Every operation, local or remote, goes through [`Document::commit`].
//! The whole op is checked against current state first, so a rejected op
//! leaves the document untouched; only then is it integrated.

use super::{Document, SlotEntry};
use crate::crdt::fugue::Placement;
use crate::crdt::history::Marker;
use crate::crdt::op::push_action;
use crate::crdt::{Action, FormatOp, Id, InsertOp, MarkOp, Operation, Side};
use crate::error::{Result, SyncError};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, instrument, warn};

/// Character runs minted by ops validated earlier in the same batch
#[derive(Debug, Default)]
struct MintedIds {
    runs: HashMap<String, BTreeMap<u64, usize>>,
}

impl MintedIds {
    fn add(&mut self, start: &Id, len: usize) {
        self.runs
            .entry(start.author.clone())
            .or_default()
            .insert(start.seq, len);
    }

    fn contains(&self, id: &Id) -> bool {
        self.runs
            .get(&id.author)
            .and_then(|runs| runs.range(..=id.seq).next_back())
            .is_some_and(|(start, len)| id.seq - start < *len as u64)
    }

    fn absorb(&mut self, other: MintedIds) {
        for (author, runs) in other.runs {
            self.runs.entry(author).or_default().extend(runs);
        }
    }
}

/// Last seq of `len` ids starting at `start`
///
/// The run must end below `u64::MAX` so the clock can still move past it.
fn run_end(start: &Id, len: usize) -> Result<u64> {
    u64::try_from(len.saturating_sub(1))
        .ok()
        .and_then(|extra| start.seq.checked_add(extra))
        .filter(|last| *last < u64::MAX)
        .ok_or_else(|| {
            SyncError::InvalidArgument(format!("{} ids from {} overflow the seq space", len, start))
        })
}

impl Document {
    /// Merge a remote operation
    ///
    /// An op that only fails for a missing dependency is buffered and
    /// retried after later merges; the error is still returned so the
    /// caller knows it has not been applied yet.
    #[instrument(skip_all, fields(author = %self.config.author))]
    pub fn merge_op(&mut self, op: Operation) -> Result<Vec<Action>> {
        match self.commit(&op) {
            Ok(mut actions) => {
                if !self.pending.is_empty() {
                    actions.extend(self.retry_pending());
                }
                Ok(actions)
            }
            Err(e) if e.is_missing_dependency() => {
                debug!(error = %e, "buffering operation with missing dependency");
                self.buffer(op);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Every applied op in id order, followed by the buffered ones
    pub fn to_ops(&self) -> Result<Vec<Operation>> {
        let mut ops = self.ops.to_ops()?;
        ops.extend(self.pending.iter().cloned());
        Ok(ops)
    }

    /// The whole document as a single snapshot op
    pub fn snapshot(&self) -> Result<Operation> {
        Ok(Operation::Snapshot(self.to_ops()?))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot()?)?)
    }

    /// Rebuild a document from an op log
    pub fn from_ops(config: super::DocumentConfig, ops: Vec<Operation>) -> Result<Self> {
        let mut doc = Self::with_config(config);
        doc.commit(&Operation::Snapshot(ops))?;
        Ok(doc)
    }

    pub fn from_json(config: super::DocumentConfig, json: &str) -> Result<Self> {
        let op: Operation = serde_json::from_str(json)?;
        match op {
            Operation::Snapshot(ops) => Self::from_ops(config, ops),
            other => Self::from_ops(config, vec![other]),
        }
    }

    /// Validate then apply one op
    pub(crate) fn commit(&mut self, op: &Operation) -> Result<Vec<Action>> {
        if let Operation::Snapshot(ops) = op {
            return self.merge_snapshot(ops);
        }
        if self.already_applied(op)? {
            return Ok(Vec::new());
        }
        let mut fresh = MintedIds::default();
        self.check(op, &MintedIds::default(), &mut fresh)?;
        self.apply(op)
    }

    fn apply(&mut self, op: &Operation) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        self.integrate(op, &mut actions)?;
        self.ops.put(op.clone())?;
        if let Some(max) = op.max_seq() {
            self.clock.update(max.saturating_add(1));
        }
        Ok(actions)
    }

    fn already_applied(&self, op: &Operation) -> Result<bool> {
        match op {
            Operation::Insert(ins) => self.has_id(&ins.id),
            other => match other.id() {
                Some(id) => self.ops.contains(id),
                None => Ok(true),
            },
        }
    }

    /// Apply a full op log
    ///
    /// Ops depending on something that is not in the log (nor already in
    /// the document) are buffered. Any other failure rejects the whole
    /// snapshot before anything is applied.
    fn merge_snapshot(&mut self, ops: &[Operation]) -> Result<Vec<Action>> {
        let mut known = MintedIds::default();
        let mut seen = HashSet::new();
        let mut ready = Vec::new();
        let mut deferred = Vec::new();

        for op in ops {
            if matches!(op, Operation::Snapshot(_)) {
                return Err(SyncError::InvalidArgument("nested snapshot".into()));
            }
            if self.already_applied(op)? {
                continue;
            }
            if let Some(id) = op.id() {
                if !seen.insert(id.clone()) {
                    continue;
                }
            }
            let mut fresh = MintedIds::default();
            match self.check(op, &known, &mut fresh) {
                Ok(()) => {
                    known.absorb(fresh);
                    ready.push(op);
                }
                Err(e) if e.is_missing_dependency() => deferred.push(op.clone()),
                Err(e) => return Err(e),
            }
        }

        debug!(
            applied = ready.len(),
            deferred = deferred.len(),
            "merging snapshot"
        );
        let mut actions = Vec::new();
        for op in ready {
            actions.extend(self.apply(op)?);
        }
        for op in deferred {
            self.buffer(op);
        }
        Ok(actions)
    }

    fn buffer(&mut self, op: Operation) {
        if self.pending.contains(&op) {
            return;
        }
        self.pending.push(op);
        if self.pending.len() > self.config.max_pending_ops {
            let dropped = self.pending.remove(0);
            warn!(
                id = ?dropped.id(),
                limit = self.config.max_pending_ops,
                "retry buffer full, dropping oldest operation"
            );
        }
    }

    /// Retry buffered ops until a full pass makes no progress
    fn retry_pending(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        loop {
            let mut progressed = false;
            for op in std::mem::take(&mut self.pending) {
                match self.commit(&op) {
                    Ok(more) => {
                        actions.extend(more);
                        progressed = true;
                    }
                    Err(e) if e.is_missing_dependency() => self.pending.push(op),
                    Err(e) => warn!(error = %e, "dropping buffered operation"),
                }
            }
            if !progressed || self.pending.is_empty() {
                break;
            }
        }
        debug!(remaining = self.pending.len(), "retried buffered operations");
        actions
    }

    fn require(&self, id: &Id, known: &MintedIds, fresh: &MintedIds) -> Result<()> {
        if known.contains(id) || fresh.contains(id) || self.has_id(id)? {
            Ok(())
        } else {
            Err(SyncError::IdNotFound(id.clone()))
        }
    }

    fn check(&self, op: &Operation, known: &MintedIds, fresh: &mut MintedIds) -> Result<()> {
        match op {
            Operation::Insert(ins) => {
                if ins.is_empty() {
                    return Err(SyncError::InvalidArgument(format!("insert {} is empty", ins.id)));
                }
                match (&ins.parent, ins.side) {
                    (None, Side::Root) => {}
                    (Some(parent), Side::Left | Side::Right) => {
                        self.require(parent, known, fresh)?
                    }
                    _ => {
                        return Err(SyncError::InvalidArgument(format!(
                            "insert {} has side {:?} with parent {:?}",
                            ins.id, ins.side, ins.parent
                        )))
                    }
                }
                let len = ins.len();
                run_end(&ins.id, len)?;
                for k in 0..len {
                    let id = ins.id.offset(k);
                    if known.contains(&id) || fresh.contains(&id) || self.has_id(&id)? {
                        return Err(SyncError::InvalidArgument(format!(
                            "id {} is already in use",
                            id
                        )));
                    }
                }
                fresh.add(&ins.id, len);
            }
            Operation::Delete(mark) | Operation::Show(mark) => {
                if mark.span == 0 {
                    return Err(SyncError::InvalidArgument(format!(
                        "mark {} has an empty span",
                        mark.id
                    )));
                }
                run_end(&mark.id, 1)?;
                run_end(&mark.target, mark.span)?;
                for target in mark.targets() {
                    self.require(&target, known, fresh)?;
                }
            }
            Operation::Format(f) => {
                run_end(&f.id, 1)?;
                self.require(&f.start, known, fresh)?;
                self.require(&f.end, known, fresh)?;
            }
            Operation::Multi(ops) => {
                for op in ops {
                    self.check(op, known, fresh)?;
                }
            }
            Operation::Rewind(rewind) => {
                run_end(&rewind.id, 1)?;
                for op in &rewind.ops {
                    self.check(op, known, fresh)?;
                }
            }
            Operation::Snapshot(_) => {
                return Err(SyncError::InvalidArgument("nested snapshot".into()))
            }
        }
        Ok(())
    }

    fn integrate(&mut self, op: &Operation, actions: &mut Vec<Action>) -> Result<()> {
        match op {
            Operation::Insert(ins) => self.integrate_insert(ins, actions),
            Operation::Delete(mark) => self.integrate_mark(mark, true, actions),
            Operation::Show(mark) => self.integrate_mark(mark, false, actions),
            Operation::Format(f) => self.integrate_format(f, actions),
            Operation::Multi(ops) => ops.iter().try_for_each(|op| self.integrate(op, actions)),
            Operation::Rewind(rewind) => rewind
                .ops
                .iter()
                .try_for_each(|op| self.integrate(op, actions)),
            Operation::Snapshot(_) => Err(SyncError::InvalidArgument("nested snapshot".into())),
        }
    }

    fn integrate_insert(&mut self, ins: &InsertOp, actions: &mut Vec<Action>) -> Result<()> {
        let mut parent = match &ins.parent {
            Some(id) => Some(self.slot_of(id)?),
            None => None,
        };
        let mut side = ins.side;

        for (k, ch) in ins.text.chars().enumerate() {
            let id = ins.id.offset(k);
            let (slot, placement) = self.fugue.attach(id.clone(), ch, parent, side)?;
            let tot = match placement {
                Placement::After(n) => self.rope.offsets(n)?.1 + 1,
                Placement::Before(n) => self.rope.offsets(n)?.1,
                Placement::Start => 0,
            };
            let stored = self.rope.insert(tot)?;
            if stored != slot {
                return Err(SyncError::Invariant(format!(
                    "rope slot {} does not match tree slot {}",
                    stored, slot
                )));
            }
            self.slots.put(SlotEntry { id, slot })?;

            let (vis, _) = self.rope.offsets(slot)?;
            self.text.insert_char(vis, ch);
            push_action(
                actions,
                Action::Insert {
                    index: vis,
                    text: ch.to_string(),
                },
            );

            parent = Some(slot);
            side = Side::Right;
        }
        Ok(())
    }

    fn integrate_mark(
        &mut self,
        mark: &MarkOp,
        deleted: bool,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        for target in mark.targets() {
            self.history.add(
                &target,
                Marker {
                    id: mark.id.clone(),
                    deleted,
                },
            )?;
            let want = self.history.is_deleted(&target);
            let slot = self.slot_of(&target)?;
            let (vis, _) = self.rope.offsets(slot)?;
            if !self.rope.set_deleted(slot, want)? {
                continue;
            }
            if want {
                self.text.remove(vis..vis + 1);
                push_action(actions, Action::Delete { index: vis, count: 1 });
            } else {
                let ch = self.fugue.node(slot)?.ch;
                self.text.insert_char(vis, ch);
                push_action(
                    actions,
                    Action::Insert {
                        index: vis,
                        text: ch.to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    fn integrate_format(&mut self, f: &FormatOp, actions: &mut Vec<Action>) -> Result<()> {
        self.formats.insert(f.clone())?;
        let (s, e) = self.tot_range(&f.start, &f.end)?;
        let (vis_start, _) = self.rope.offsets(self.tot_slot(s)?)?;
        let end_slot = self.tot_slot(e)?;
        let (vis_end, _) = self.rope.offsets(end_slot)?;
        let vis_end = vis_end + usize::from(!self.rope.is_deleted(end_slot));
        if vis_end > vis_start {
            actions.push(Action::Format {
                index: vis_start,
                length: vis_end - vis_start,
                format: f.format.clone(),
            });
        }
        Ok(())
    }

    fn tot_slot(&self, ix: usize) -> Result<usize> {
        self.rope.find_tot(ix).ok_or(SyncError::PositionOutOfBounds {
            position: ix,
            length: self.rope.tot_len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentConfig;
    use crate::format::Format;
    use proptest::prelude::*;

    fn insert(author: &str, seq: u64, text: &str, parent: Option<Id>, side: Side) -> Operation {
        Operation::Insert(InsertOp {
            id: Id::new(author, seq),
            text: text.into(),
            parent,
            side,
        })
    }

    #[test]
    fn test_concurrent_inserts_converge() {
        let mut alice = Document::new("alice");
        let mut bob = Document::new("bob");

        let hello = alice.insert(0, "Hello").unwrap();
        bob.merge_op(hello).unwrap();

        let bang = alice.insert(5, "!").unwrap();
        let world = bob.insert(5, " World").unwrap();

        alice.merge_op(world).unwrap();
        bob.merge_op(bang).unwrap();

        assert_eq!(alice.get_text(), bob.get_text());
        assert!(alice.get_text().starts_with("Hello"));
        assert_eq!(alice.len(), 12);
        alice.validate().unwrap();
        bob.validate().unwrap();
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut alice = Document::new("alice");
        let mut bob = Document::new("bob");
        let op = alice.insert(0, "abc").unwrap();

        let first = bob.merge_op(op.clone()).unwrap();
        assert_eq!(
            first,
            vec![Action::Insert {
                index: 0,
                text: "abc".into()
            }]
        );
        assert!(bob.merge_op(op).unwrap().is_empty());
        assert_eq!(bob.get_text(), "abc");

        let del = alice.delete(1, 1).unwrap();
        bob.merge_op(del.clone()).unwrap();
        assert!(bob.merge_op(del).unwrap().is_empty());
        assert_eq!(bob.get_text(), "ac");
    }

    #[test]
    fn test_missing_dependency_is_buffered() {
        let mut alice = Document::new("alice");
        let mut bob = Document::new("bob");
        let first = alice.insert(0, "ab").unwrap();
        let second = alice.insert(2, "cd").unwrap();

        let err = bob.merge_op(second).unwrap_err();
        assert!(err.is_missing_dependency());
        assert_eq!(bob.pending_ops().len(), 1);
        assert_eq!(bob.get_text(), "");

        let actions = bob.merge_op(first).unwrap();
        assert_eq!(bob.get_text(), "abcd");
        assert!(bob.pending_ops().is_empty());
        assert_eq!(actions.len(), 2);
    }

    #[test]
    fn test_duplicate_buffered_ops_are_ignored() {
        let mut doc = Document::new("bob");
        let orphan = insert("x", 3, "z", Some(Id::new("x", 0)), Side::Right);
        assert!(doc.merge_op(orphan.clone()).is_err());
        assert!(doc.merge_op(orphan).is_err());
        assert_eq!(doc.pending_ops().len(), 1);
    }

    #[test]
    fn test_retry_buffer_is_bounded() {
        let mut config = DocumentConfig::new("bob");
        config.max_pending_ops = 2;
        let mut doc = Document::with_config(config);
        for seq in 1..=3 {
            let orphan = insert("x", seq * 10, "z", Some(Id::new("x", 0)), Side::Right);
            assert!(doc.merge_op(orphan).is_err());
        }
        let pending: Vec<u64> = doc
            .pending_ops()
            .iter()
            .filter_map(|op| op.id().map(|id| id.seq))
            .collect();
        assert_eq!(pending, vec![20, 30]);
    }

    #[test]
    fn test_invalid_op_leaves_document_untouched() {
        let mut doc = Document::new("a");
        doc.insert(0, "abc").unwrap();
        let before = doc.to_ops().unwrap();

        let bad = Operation::Multi(vec![
            insert("b", 10, "x", Some(Id::new("a", 0)), Side::Right),
            insert("b", 20, "", None, Side::Root),
        ]);
        let err = doc.merge_op(bad).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert_eq!(doc.get_text(), "abc");
        assert_eq!(doc.to_ops().unwrap(), before);
        assert!(doc.pending_ops().is_empty());
    }

    #[test]
    fn test_bad_anchor_rejected() {
        let mut doc = Document::new("a");
        let op = insert("b", 1, "x", Some(Id::new("b", 0)), Side::Root);
        assert!(matches!(
            doc.merge_op(op),
            Err(SyncError::InvalidArgument(_))
        ));
        let op = insert("b", 1, "x", None, Side::Left);
        assert!(doc.merge_op(op).is_err());
    }

    #[test]
    fn test_insert_over_existing_middle_id_rejected() {
        let mut doc = Document::new("a");
        doc.merge_op(insert("b", 5, "q", None, Side::Root)).unwrap();
        // b_4..b_6 straddles the existing b_5
        let err = doc
            .merge_op(insert("b", 4, "xyz", None, Side::Root))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
        assert_eq!(doc.get_text(), "q");
        assert_eq!(doc.get_index(&Id::new("b", 5)).unwrap(), (Some(0), 0));
        doc.validate().unwrap();
    }

    #[test]
    fn test_seq_overflow_rejected() {
        let mut doc = Document::new("a");
        doc.insert(0, "abc").unwrap();
        let clock = doc.clock();

        let wire: Operation =
            serde_json::from_str(r#"[1,["z",18446744073709551615],["a",0],1]"#).unwrap();
        let bad = [
            wire,
            insert("z", u64::MAX - 1, "xy", None, Side::Root),
            Operation::Delete(MarkOp {
                id: Id::new("z", 1),
                target: Id::new("a", u64::MAX),
                span: 2,
            }),
            Operation::Format(FormatOp {
                id: Id::new("z", u64::MAX),
                start: Id::new("a", 0),
                end: Id::new("a", 1),
                format: Format::span([("b", "true")]),
            }),
        ];
        for op in bad {
            assert!(matches!(
                doc.merge_op(op),
                Err(SyncError::InvalidArgument(_))
            ));
        }
        assert_eq!(doc.get_text(), "abc");
        assert_eq!(doc.clock(), clock);
        assert!(doc.pending_ops().is_empty());
    }

    #[test]
    fn test_remerge_while_ops_are_buffered() {
        let mut alice = Document::new("alice");
        let mut bob = Document::new("bob");
        let orphan = insert("x", 3, "z", Some(Id::new("x", 0)), Side::Right);
        assert!(bob.merge_op(orphan).is_err());

        let base = alice.insert(0, "ab").unwrap();
        let bold = alice.format(0, 2, Format::span([("b", "true")])).unwrap();
        let multi = Operation::Multi(vec![
            insert("c", 1, "qq", Some(Id::new("alice", 1)), Side::Right),
            Operation::Format(FormatOp {
                id: Id::new("c", 3),
                start: Id::new("c", 1),
                end: Id::new("c", 2),
                format: Format::span([("i", "true")]),
            }),
        ]);
        for op in [base, bold, multi] {
            assert!(!bob.merge_op(op.clone()).unwrap().is_empty());
            assert!(bob.merge_op(op).unwrap().is_empty());
            assert_eq!(bob.pending_ops().len(), 1);
        }
        assert_eq!(bob.get_text(), "abqq");

        bob.merge_op(insert("x", 0, "w", None, Side::Root)).unwrap();
        assert!(bob.pending_ops().is_empty());
        assert_eq!(bob.get_text().matches('z').count(), 1);
        assert_eq!(bob.len(), 6);
        bob.validate().unwrap();
    }

    #[test]
    fn test_multi_sub_ops_depend_on_earlier_ones() {
        let mut doc = Document::new("a");
        let op = Operation::Multi(vec![
            insert("b", 1, "xy", None, Side::Root),
            Operation::Delete(MarkOp {
                id: Id::new("b", 3),
                target: Id::new("b", 1),
                span: 1,
            }),
        ]);
        doc.merge_op(op).unwrap();
        assert_eq!(doc.get_text(), "y");
        assert!(doc.clock() >= 4);
    }

    #[test]
    fn test_concurrent_delete_and_show() {
        let mut doc = Document::new("a");
        doc.insert(0, "x").unwrap();
        let target = doc.get_tot_id(0).unwrap();
        let mark = |seq, deleted: bool| {
            let m = MarkOp {
                id: Id::new("r", seq),
                target: target.clone(),
                span: 1,
            };
            if deleted {
                Operation::Delete(m)
            } else {
                Operation::Show(m)
            }
        };

        doc.merge_op(mark(10, false)).unwrap();
        doc.merge_op(mark(5, true)).unwrap();
        assert_eq!(doc.get_text(), "x", "newer show wins over older delete");

        doc.merge_op(mark(11, true)).unwrap();
        assert_eq!(doc.get_text(), "");
    }

    #[test]
    fn test_actions_report_visible_changes() {
        let mut alice = Document::new("alice");
        let mut bob = Document::new("bob");
        bob.merge_op(alice.insert(0, "hello").unwrap()).unwrap();

        let del = alice.delete(1, 3).unwrap();
        assert_eq!(
            bob.merge_op(del).unwrap(),
            vec![Action::Delete { index: 1, count: 3 }]
        );

        let fmt = alice.format(0, 2, Format::span([("b", "true")])).unwrap();
        assert_eq!(
            bob.merge_op(fmt).unwrap(),
            vec![Action::Format {
                index: 0,
                length: 2,
                format: Format::span([("b", "true")]),
            }]
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut doc = Document::new("a");
        doc.insert(0, "hello world").unwrap();
        doc.delete(5, 6).unwrap();
        doc.format(0, 5, Format::span([("i", "true")])).unwrap();

        let json = doc.to_json().unwrap();
        let copy = Document::from_json(DocumentConfig::new("b"), &json).unwrap();
        assert_eq!(copy.get_text(), "hello");
        assert_eq!(copy.to_ops().unwrap(), doc.to_ops().unwrap());
        copy.validate().unwrap();
    }

    #[test]
    fn test_snapshot_defers_ops_missing_dependencies() {
        let mut doc = Document::new("a");
        let ops = vec![
            insert("b", 1, "hi", None, Side::Root),
            insert("c", 5, "?", Some(Id::new("z", 9)), Side::Right),
        ];
        doc.merge_op(Operation::Snapshot(ops)).unwrap();
        assert_eq!(doc.get_text(), "hi");
        assert_eq!(doc.pending_ops().len(), 1);
    }

    #[test]
    fn test_snapshot_rejects_invalid_op_atomically() {
        let mut doc = Document::new("a");
        let ops = vec![
            insert("b", 1, "hi", None, Side::Root),
            insert("b", 2, "x", None, Side::Root),
        ];
        assert!(doc.merge_op(Operation::Snapshot(ops)).is_err());
        assert_eq!(doc.get_text(), "");
        assert_eq!(doc.tot_len(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_any_delivery_order_converges(
            edits in prop::collection::vec((0usize..3, 0usize..20, "[a-c]{1,3}", any::<bool>()), 1..20),
            order in any::<u64>(),
        ) {
            let authors = ["a", "b", "c"];
            let mut docs: Vec<Document> = authors.iter().map(|a| Document::new(*a)).collect();
            let mut log = Vec::new();

            for (who, pos, text, delete) in edits {
                let doc = &mut docs[who];
                let op = if delete && !doc.is_empty() {
                    let at = pos % doc.len();
                    doc.delete(at, 1).unwrap()
                } else {
                    let at = pos % (doc.len() + 1);
                    doc.insert(at, &text).unwrap()
                };
                log.push(op.clone());
                // deliver to the next author right away so edits interleave
                let next = (who + 1) % authors.len();
                let _ = docs[next].merge_op(op);
            }

            let mut forward = Document::new("x");
            for op in &log {
                let _ = forward.merge_op(op.clone());
            }
            let mut shuffled = log.clone();
            let mut seed = order;
            for i in (1..shuffled.len()).rev() {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                shuffled.swap(i, (seed >> 33) as usize % (i + 1));
            }
            let mut backward = Document::new("y");
            for op in shuffled {
                let _ = backward.merge_op(op);
            }
            prop_assert!(forward.pending_ops().is_empty());
            prop_assert!(backward.pending_ops().is_empty());
            prop_assert_eq!(forward.get_text(), backward.get_text());
            backward.validate().unwrap();
        }
    }
}
