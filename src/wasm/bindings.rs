//! JavaScript bindings for the rich-text document
//!
//! Ids, operations, addresses and formats cross the boundary as JSON
//! strings in their wire form, so the host never depends on Rust layouts.

use crate::crdt::{ContentAddress, Id, Operation};
use crate::document::{Document, DocumentConfig, PasteItem};
use crate::error::SyncError;
use crate::format::{Format, SpanFormat};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use wasm_bindgen::prelude::*;

fn parse<T: DeserializeOwned>(what: &str, json: &str) -> Result<T, JsValue> {
    serde_json::from_str(json).map_err(|e| JsValue::from_str(&format!("Invalid {} JSON: {}", what, e)))
}

fn parse_opt<T: DeserializeOwned>(what: &str, json: Option<String>) -> Result<Option<T>, JsValue> {
    json.map(|j| parse(what, &j)).transpose()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("JSON serialization failed: {}", e)))
}

fn failed(operation: &'static str) -> impl Fn(SyncError) -> JsValue {
    move |e| JsValue::from_str(&format!("{} failed: {}", operation, e))
}

fn op_with_cursor<C: Serialize>(result: Option<(Operation, C)>) -> Result<Option<String>, JsValue> {
    result
        .map(|(op, cursor)| to_json(&json!({ "op": op, "cursor": cursor })))
        .transpose()
}

/// JavaScript-friendly wrapper for Document
#[wasm_bindgen]
pub struct WasmDocument {
    inner: Document,
}

#[wasm_bindgen]
impl WasmDocument {
    /// Create an empty document editing as `author`
    #[wasm_bindgen(constructor)]
    pub fn new(author: String) -> Self {
        Self {
            inner: Document::new(author),
        }
    }

    /// Create an empty document from partial config JSON
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(config_json: String) -> Result<WasmDocument, JsValue> {
        let config: DocumentConfig = parse("config", &config_json)?;
        Ok(Self {
            inner: Document::with_config(config),
        })
    }

    /// Rebuild a document from an exported op log
    #[wasm_bindgen(js_name = fromJSON)]
    pub fn from_json(config_json: String, json: String) -> Result<WasmDocument, JsValue> {
        let config: DocumentConfig = parse("config", &config_json)?;
        let inner = Document::from_json(config, &json).map_err(failed("fromJSON"))?;
        Ok(Self { inner })
    }

    #[wasm_bindgen(js_name = getAuthor)]
    pub fn get_author(&self) -> String {
        self.inner.author().to_string()
    }

    #[wasm_bindgen(js_name = length)]
    pub fn length(&self) -> usize {
        self.inner.len()
    }

    #[wasm_bindgen(js_name = getText)]
    pub fn get_text(&self) -> String {
        self.inner.get_text()
    }

    // Local edits

    #[wasm_bindgen(js_name = insert)]
    pub fn insert(&mut self, ix: usize, text: String) -> Result<String, JsValue> {
        to_json(&self.inner.insert(ix, &text).map_err(failed("insert"))?)
    }

    /// Returns `{op, cursor}` where cursor is the id left of the caret
    #[wasm_bindgen(js_name = richInsert)]
    pub fn rich_insert(
        &mut self,
        ix: usize,
        sel_len: usize,
        format_json: Option<String>,
        text: String,
    ) -> Result<String, JsValue> {
        let format: Option<SpanFormat> = parse_opt("format", format_json)?;
        let (op, cursor) = self
            .inner
            .rich_insert(ix, sel_len, format, &text)
            .map_err(failed("richInsert"))?;
        to_json(&json!({ "op": op, "cursor": cursor }))
    }

    #[wasm_bindgen(js_name = delete)]
    pub fn delete(&mut self, ix: usize, count: usize) -> Result<String, JsValue> {
        to_json(&self.inner.delete(ix, count).map_err(failed("delete"))?)
    }

    #[wasm_bindgen(js_name = richDelete)]
    pub fn rich_delete(&mut self, ix: usize, len: usize) -> Result<String, JsValue> {
        let (op, cursor) = self.inner.rich_delete(ix, len).map_err(failed("richDelete"))?;
        to_json(&json!({ "op": op, "cursor": cursor }))
    }

    #[wasm_bindgen(js_name = richDeleteLine)]
    pub fn rich_delete_line(&mut self, ix: usize) -> Result<Option<String>, JsValue> {
        op_with_cursor(self.inner.rich_delete_line(ix).map_err(failed("richDeleteLine"))?)
    }

    #[wasm_bindgen(js_name = richDeleteWord)]
    pub fn rich_delete_word(&mut self, ix: usize, forward: bool) -> Result<Option<String>, JsValue> {
        op_with_cursor(self.inner.rich_delete_word(ix, forward).map_err(failed("richDeleteWord"))?)
    }

    /// Apply a span or line format given as wire JSON
    #[wasm_bindgen(js_name = format)]
    pub fn format(&mut self, ix: usize, len: usize, format_json: String) -> Result<String, JsValue> {
        let format: Format = parse("format", &format_json)?;
        to_json(&self.inner.format(ix, len, format).map_err(failed("format"))?)
    }

    #[wasm_bindgen(js_name = formatLineById)]
    pub fn format_line_by_id(&mut self, id_json: String, format_json: String) -> Result<String, JsValue> {
        let id: Id = parse("id", &id_json)?;
        let Format::Line(line) = parse::<Format>("format", &format_json)? else {
            return Err(JsValue::from_str("formatLineById needs a line format"));
        };
        to_json(&self.inner.format_line_by_id(&id, line).map_err(failed("formatLineById"))?)
    }

    #[wasm_bindgen(js_name = clearFormats)]
    pub fn clear_formats(&mut self, start_json: String, end_json: String) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        to_json(&self.inner.clear_formats(&start, &end).map_err(failed("clearFormats"))?)
    }

    /// Paste clipboard items; returns `{op, cursor}` or undefined
    #[wasm_bindgen(js_name = paste)]
    pub fn paste(
        &mut self,
        ix: usize,
        sel_len: usize,
        format_json: Option<String>,
        items_json: String,
    ) -> Result<Option<String>, JsValue> {
        let format: Option<SpanFormat> = parse_opt("format", format_json)?;
        let items: Vec<PasteItem> = parse("paste items", &items_json)?;
        op_with_cursor(self.inner.paste(ix, sel_len, format, &items).map_err(failed("paste"))?)
    }

    #[wasm_bindgen(js_name = pasteHtml)]
    pub fn paste_html(&mut self, ix: usize, sel_len: usize, html: String) -> Result<Option<String>, JsValue> {
        op_with_cursor(self.inner.paste_html(ix, sel_len, &html).map_err(failed("pasteHtml"))?)
    }

    /// Returns `{op, actions}`
    #[wasm_bindgen(js_name = insertMarkdown)]
    pub fn insert_markdown(&mut self, ix: usize, md: String) -> Result<String, JsValue> {
        let (op, actions) = self.inner.insert_markdown(ix, &md).map_err(failed("insertMarkdown"))?;
        to_json(&json!({ "op": op, "actions": actions }))
    }

    #[wasm_bindgen(js_name = applyMarkdownDiff)]
    pub fn apply_markdown_diff(
        &mut self,
        md: String,
        before_json: String,
        after_json: String,
    ) -> Result<String, JsValue> {
        let before: Id = parse("id", &before_json)?;
        let after: Id = parse("id", &after_json)?;
        let (op, actions) = self
            .inner
            .apply_markdown_diff(&md, &before, &after)
            .map_err(failed("applyMarkdownDiff"))?;
        to_json(&json!({ "op": op, "actions": actions }))
    }

    // Remote integration

    /// Merge a remote operation and return the visible actions
    #[wasm_bindgen(js_name = mergeOp)]
    pub fn merge_op(&mut self, op_json: String) -> Result<String, JsValue> {
        let op: Operation = parse("operation", &op_json)?;
        let pending = self.inner.pending_ops().len();
        let actions = match self.inner.merge_op(op) {
            Ok(actions) => actions,
            Err(e) if e.is_missing_dependency() => {
                crate::console_log!(
                    "mergeOp deferred: {} ops waiting on dependencies",
                    self.inner.pending_ops().len()
                );
                return Err(failed("mergeOp")(e));
            }
            Err(e) => {
                crate::console_warn!("mergeOp rejected: {}", e);
                return Err(failed("mergeOp")(e));
            }
        };
        if self.inner.pending_ops().len() > pending {
            crate::console_log!(
                "snapshot deferred {} ops",
                self.inner.pending_ops().len() - pending
            );
        }
        to_json(&actions)
    }

    #[wasm_bindgen(js_name = toOps)]
    pub fn to_ops(&self) -> Result<String, JsValue> {
        to_json(&self.inner.to_ops().map_err(failed("toOps"))?)
    }

    #[wasm_bindgen(js_name = snapshot)]
    pub fn snapshot(&self) -> Result<String, JsValue> {
        to_json(&self.inner.snapshot().map_err(failed("snapshot"))?)
    }

    #[wasm_bindgen(js_name = toJSON)]
    pub fn to_json(&self) -> Result<String, JsValue> {
        self.inner.to_json().map_err(failed("toJSON"))
    }

    // Positions

    #[wasm_bindgen(js_name = getVisId)]
    pub fn get_vis_id(&self, ix: usize) -> Result<String, JsValue> {
        to_json(&self.inner.get_vis_id(ix).map_err(failed("getVisId"))?)
    }

    #[wasm_bindgen(js_name = getTotId)]
    pub fn get_tot_id(&self, ix: usize) -> Result<String, JsValue> {
        to_json(&self.inner.get_tot_id(ix).map_err(failed("getTotId"))?)
    }

    /// Returns `[visibleIndex | null, totalIndex]`
    #[wasm_bindgen(js_name = getIndex)]
    pub fn get_index(&self, id_json: String) -> Result<String, JsValue> {
        let id: Id = parse("id", &id_json)?;
        to_json(&self.inner.get_index(&id).map_err(failed("getIndex"))?)
    }

    #[wasm_bindgen(js_name = getNode)]
    pub fn get_node(&self, ix: usize) -> Result<String, JsValue> {
        to_json(&self.inner.get_node(ix).map_err(failed("getNode"))?)
    }

    /// Returns `[offset, length]`
    #[wasm_bindgen(js_name = highlightSpan)]
    pub fn highlight_span(&self, before_json: String, after_json: String) -> Result<String, JsValue> {
        let before: Id = parse("id", &before_json)?;
        let after: Id = parse("id", &after_json)?;
        to_json(&self.inner.highlight_span(&before, &after).map_err(failed("highlightSpan"))?)
    }

    // Rendering

    #[wasm_bindgen(js_name = getPlaintext)]
    pub fn get_plaintext(
        &self,
        start_json: String,
        end_json: String,
        address_json: Option<String>,
    ) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let address: Option<ContentAddress> = parse_opt("address", address_json)?;
        self.inner
            .get_plaintext(&start, &end, address.as_ref())
            .map_err(failed("getPlaintext"))
    }

    #[wasm_bindgen(js_name = getHtml)]
    pub fn get_html(&self, start_json: String, end_json: String, include_ids: bool) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        self.inner.get_html(&start, &end, include_ids).map_err(failed("getHtml"))
    }

    #[wasm_bindgen(js_name = getFullHtml)]
    pub fn get_full_html(&self, include_ids: bool) -> Result<String, JsValue> {
        self.inner.get_full_html(include_ids).map_err(failed("getFullHtml"))
    }

    #[wasm_bindgen(js_name = getHtmlAt)]
    pub fn get_html_at(
        &self,
        start_json: String,
        end_json: String,
        address_json: String,
        include_ids: bool,
    ) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let address: ContentAddress = parse("address", &address_json)?;
        self.inner
            .get_html_at(&start, &end, &address, include_ids)
            .map_err(failed("getHtmlAt"))
    }

    #[wasm_bindgen(js_name = getHtmlDiff)]
    pub fn get_html_diff(
        &self,
        start_json: String,
        end_json: String,
        address_json: String,
        include_ids: bool,
    ) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let address: ContentAddress = parse("address", &address_json)?;
        self.inner
            .get_html_diff(&start, &end, &address, include_ids)
            .map_err(failed("getHtmlDiff"))
    }

    #[wasm_bindgen(js_name = getHtmlDiffBetween)]
    pub fn get_html_diff_between(
        &self,
        start_json: String,
        end_json: String,
        from_json: String,
        to_json_str: String,
        include_ids: bool,
    ) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let from: ContentAddress = parse("address", &from_json)?;
        let to: ContentAddress = parse("address", &to_json_str)?;
        self.inner
            .get_html_diff_between(&start, &end, &from, &to, include_ids)
            .map_err(failed("getHtmlDiffBetween"))
    }

    #[wasm_bindgen(js_name = getMarkdown)]
    pub fn get_markdown(&self, start_json: String, end_json: String) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        self.inner.get_markdown(&start, &end).map_err(failed("getMarkdown"))
    }

    #[wasm_bindgen(js_name = getFullMarkdown)]
    pub fn get_full_markdown(&self) -> Result<String, JsValue> {
        self.inner.get_full_markdown().map_err(failed("getFullMarkdown"))
    }

    #[wasm_bindgen(js_name = getSelection)]
    pub fn get_selection(
        &self,
        start_json: String,
        end_json: String,
        address_json: Option<String>,
    ) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let address: Option<ContentAddress> = parse_opt("address", address_json)?;
        to_json(
            &self
                .inner
                .get_selection(&start, &end, address.as_ref())
                .map_err(failed("getSelection"))?,
        )
    }

    #[wasm_bindgen(js_name = getCurSpanFormat)]
    pub fn get_cur_span_format(&self, start_json: String, end_json: String) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        to_json(&self.inner.get_cur_span_format(&start, &end).map_err(failed("getCurSpanFormat"))?)
    }

    #[wasm_bindgen(js_name = getCurLineFormat)]
    pub fn get_cur_line_format(&self, start_json: String, end_json: String) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let line = self.inner.get_cur_line_format(&start, &end).map_err(failed("getCurLineFormat"))?;
        to_json(&Format::Line(line))
    }

    // Addressing and history

    #[wasm_bindgen(js_name = getAddress)]
    pub fn get_address(&self, start_json: String, end_json: String) -> Result<String, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        to_json(&self.inner.get_address(&start, &end).map_err(failed("getAddress"))?)
    }

    #[wasm_bindgen(js_name = rewind)]
    pub fn rewind(
        &mut self,
        start_json: String,
        end_json: String,
        address_json: String,
    ) -> Result<Option<String>, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let address: ContentAddress = parse("address", &address_json)?;
        let op = self.inner.rewind(&start, &end, &address).map_err(failed("rewind"))?;
        op.map(|op| to_json(&op)).transpose()
    }

    #[wasm_bindgen(js_name = undo)]
    pub fn undo(&mut self, start_json: String, end_json: String) -> Result<Option<String>, JsValue> {
        let (start, end) = (parse::<Id>("id", &start_json)?, parse::<Id>("id", &end_json)?);
        let op = self.inner.undo(&start, &end).map_err(failed("undo"))?;
        op.map(|op| to_json(&op)).transpose()
    }

    #[wasm_bindgen(js_name = redo)]
    pub fn redo(&mut self) -> Result<Option<String>, JsValue> {
        let op = self.inner.redo().map_err(failed("redo"))?;
        op.map(|op| to_json(&op)).transpose()
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.inner.can_undo()
    }

    #[wasm_bindgen(js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.inner.can_redo()
    }

    /// Enter scrub mode over the whole history or one id range
    #[wasm_bindgen(js_name = scrubInit)]
    pub fn scrub_init(&mut self, start_json: Option<String>, end_json: Option<String>) -> Result<usize, JsValue> {
        let start: Option<Id> = parse_opt("id", start_json)?;
        let end: Option<Id> = parse_opt("id", end_json)?;
        self.inner
            .scrub_init(start.as_ref(), end.as_ref())
            .map_err(failed("scrubInit"))
    }

    /// Returns `{html, cursorStart, cursorEnd}`
    #[wasm_bindgen(js_name = scrubTo)]
    pub fn scrub_to(&mut self, step: usize) -> Result<String, JsValue> {
        to_json(&self.inner.scrub_to(step).map_err(failed("scrubTo"))?)
    }

    #[wasm_bindgen(js_name = scrubRevert)]
    pub fn scrub_revert(&mut self) -> Result<Option<String>, JsValue> {
        let op = self.inner.scrub_revert().map_err(failed("scrubRevert"))?;
        op.map(|op| to_json(&op)).transpose()
    }

    #[wasm_bindgen(js_name = scrubExit)]
    pub fn scrub_exit(&mut self) -> Result<(), JsValue> {
        self.inner.scrub_exit().map_err(failed("scrubExit"))
    }

    #[wasm_bindgen(js_name = scrubMax)]
    pub fn scrub_max(&self) -> Result<usize, JsValue> {
        self.inner.scrub_max().map_err(failed("scrubMax"))
    }

    // Introspection

    #[wasm_bindgen(js_name = docStats)]
    pub fn doc_stats(&self) -> Result<String, JsValue> {
        to_json(&self.inner.doc_stats())
    }

    #[wasm_bindgen(js_name = opStats)]
    pub fn op_stats(&self) -> Result<String, JsValue> {
        to_json(&self.inner.op_stats().map_err(failed("opStats"))?)
    }
}
