//! Receive-side line re-assembly
//!
//! Turns transport fragments into display text. A CR LF terminator may be
//! split across two reads; the lone CR is first rendered as `^M` and then
//! taken back when the LF arrives at the head of the next fragment.
//!
//! The rendered history is bounded: once it grows past its limit the
//! oldest text is dropped, keeping the most recent three quarters.

use tracing::debug;

use crate::codec::{to_caret_string, to_hex, Newline, RenderMode};

/// Width of the caret rendering of a lone carriage return (`^M`)
const CARRIAGE_RETURN_ARTIFACT: usize = 2;

/// Default bound in bytes of the rendered history
pub const DEFAULT_MAX_RENDERED: usize = 256 * 1024;

/// Smallest accepted history bound
const MIN_MAX_RENDERED: usize = 64;

/// Display text produced by one call to [`LineBuffer::process`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedText {
    /// Characters to remove from the tail of previously delivered text
    pub retract: usize,
    /// Text to append afterwards
    pub text: String,
}

impl RenderedText {
    /// Apply this update to an incrementally rendered buffer
    ///
    /// Retraction stops at the start of `out`.
    pub fn apply_to(&self, out: &mut String) {
        for _ in 0..self.retract {
            if out.pop().is_none() {
                break;
            }
        }
        out.push_str(&self.text);
    }
}

/// Stateful fragment re-assembler
#[derive(Debug, Clone)]
pub struct LineBuffer {
    mode: RenderMode,
    newline: Newline,
    /// Last processed text fragment ended in a CR that may still pair with an LF
    pending_carriage_return: bool,
    /// Most recent rendered text, at most `max_rendered` bytes
    rendered: String,
    max_rendered: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(RenderMode::Text, Newline::Crlf)
    }
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new(mode: RenderMode, newline: Newline) -> Self {
        Self {
            mode,
            newline,
            pending_carriage_return: false,
            rendered: String::new(),
            max_rendered: DEFAULT_MAX_RENDERED,
        }
    }

    /// Bound the rendered history to `max` bytes
    pub fn with_max_rendered(mut self, max: usize) -> Self {
        self.set_max_rendered(max);
        self
    }

    /// Change the history bound, trimming right away if needed
    pub fn set_max_rendered(&mut self, max: usize) {
        self.max_rendered = max.max(MIN_MAX_RENDERED);
        self.trim_history();
    }

    /// Current history bound in bytes
    pub fn max_rendered(&self) -> usize {
        self.max_rendered
    }

    /// Current render mode
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Switch render mode for subsequent fragments
    pub fn set_mode(&mut self, mode: RenderMode) {
        self.mode = mode;
        self.pending_carriage_return = false;
    }

    /// Configured line terminator
    pub fn newline(&self) -> Newline {
        self.newline
    }

    /// Change the line terminator; a pending CR is forgotten
    pub fn set_newline(&mut self, newline: Newline) {
        self.newline = newline;
        self.pending_carriage_return = false;
    }

    /// True while a split CR LF may be waiting for its LF
    pub fn pending_carriage_return(&self) -> bool {
        self.pending_carriage_return
    }

    /// Forget a CR still waiting for its LF (new link, nothing to pair with)
    pub fn discard_pending(&mut self) {
        self.pending_carriage_return = false;
    }

    /// Recent rendered text, with corrections applied
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    /// Drop the rendered text (e.g. the display was cleared)
    pub fn clear(&mut self) {
        self.rendered.clear();
    }

    /// Process one fragment
    ///
    /// Returns `None` for an empty fragment.
    pub fn process(&mut self, chunk: &[u8]) -> Option<RenderedText> {
        self.process_batch(std::iter::once(chunk))
    }

    /// Process several fragments in order as one emission
    pub fn process_batch<'a, I>(&mut self, chunks: I) -> Option<RenderedText>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut update = RenderedText::default();
        let mut any = false;

        for chunk in chunks {
            if chunk.is_empty() {
                continue;
            }
            any = true;
            match self.mode {
                RenderMode::Hex => {
                    self.pending_carriage_return = false;
                    update.text.push_str(&to_hex(chunk));
                    update.text.push('\n');
                }
                RenderMode::Text => self.render_text(chunk, &mut update),
            }
        }

        if !any {
            return None;
        }

        debug!(
            retract = update.retract,
            len = update.text.len(),
            "rendered received data"
        );
        update.apply_to(&mut self.rendered);
        self.trim_history();
        Some(update)
    }

    fn trim_history(&mut self) {
        if self.rendered.len() <= self.max_rendered {
            return;
        }
        let keep = self.max_rendered / 4 * 3;
        let mut cut = self.rendered.len() - keep;
        while !self.rendered.is_char_boundary(cut) {
            cut += 1;
        }
        self.rendered.drain(..cut);
    }

    fn render_text(&mut self, chunk: &[u8], update: &mut RenderedText) {
        let mut msg = String::from_utf8_lossy(chunk).into_owned();

        if self.newline == Newline::Crlf {
            // A CR directly before LF would otherwise show up as ^M
            msg = msg.replace("\r\n", "\n");

            if self.pending_carriage_return && msg.starts_with('\n') {
                self.retract_artifact(update);
            }
            self.pending_carriage_return = msg.ends_with('\r');
        }

        update
            .text
            .push_str(&to_caret_string(&msg, self.newline.is_terminator_aware()));
    }

    /// Remove the `^M` left by a CR whose LF arrived in this fragment
    fn retract_artifact(&self, update: &mut RenderedText) {
        let local = update.text.chars().count();
        // Only the tail matters; counting the whole history is not needed
        let prior = self
            .rendered
            .chars()
            .rev()
            .take(update.retract + CARRIAGE_RETURN_ARTIFACT)
            .count()
            .saturating_sub(update.retract);
        if local + prior < CARRIAGE_RETURN_ARTIFACT {
            debug!("split terminator correction skipped, rendered text too short");
            return;
        }

        let from_local = local.min(CARRIAGE_RETURN_ARTIFACT);
        for _ in 0..from_local {
            update.text.pop();
        }
        update.retract += CARRIAGE_RETURN_ARTIFACT - from_local;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(update: Option<RenderedText>) -> String {
        update.map(|u| u.text).unwrap_or_default()
    }

    #[test]
    fn test_single_chunk_crlf_collapses() {
        let mut buffer = LineBuffer::default();
        let update = buffer.process(b"a\r\nb").unwrap();
        assert_eq!(update.text, "a\nb");
        assert_eq!(update.retract, 0);
        assert!(!buffer.pending_carriage_return());
    }

    #[test]
    fn test_split_crlf_retracts_artifact() {
        let mut buffer = LineBuffer::default();

        let first = buffer.process(b"hello\r").unwrap();
        assert_eq!(first.text, "hello^M");
        assert!(buffer.pending_carriage_return());

        let second = buffer.process(b"\nworld").unwrap();
        assert_eq!(second.retract, 2);
        assert_eq!(second.text, "\nworld");
        assert!(!buffer.pending_carriage_return());

        assert_eq!(buffer.rendered(), "hello\nworld");
    }

    #[test]
    fn test_split_equivalent_to_single_chunk() {
        let mut split = LineBuffer::default();
        split.process(b"hello\r");
        split.process(b"\nworld");

        let mut whole = LineBuffer::default();
        whole.process(b"hello\r\nworld");

        assert_eq!(split.rendered(), whole.rendered());
    }

    #[test]
    fn test_lone_cr_not_followed_by_lf_stays_visible() {
        let mut buffer = LineBuffer::default();
        buffer.process(b"50%\r");
        let update = buffer.process(b"60%").unwrap();
        assert_eq!(update.retract, 0);
        assert_eq!(buffer.rendered(), "50%^M60%");
    }

    #[test]
    fn test_correction_skipped_after_clear() {
        let mut buffer = LineBuffer::default();
        buffer.process(b"\r");
        buffer.clear();

        let update = buffer.process(b"\nnext").unwrap();
        assert_eq!(update.retract, 0);
        assert_eq!(buffer.rendered(), "\nnext");
    }

    #[test]
    fn test_batch_correction_stays_local() {
        let mut buffer = LineBuffer::default();
        let chunks: [&[u8]; 2] = [b"ok\r", b"\n"];
        let update = buffer.process_batch(chunks).unwrap();
        assert_eq!(update.retract, 0);
        assert_eq!(update.text, "ok\n");
    }

    #[test]
    fn test_empty_chunk_emits_nothing() {
        let mut buffer = LineBuffer::default();
        buffer.process(b"x\r");
        assert_eq!(buffer.process(b""), None);
        assert!(buffer.pending_carriage_return());
        let chunks: [&[u8]; 0] = [];
        assert_eq!(buffer.process_batch(chunks), None);
    }

    #[test]
    fn test_hex_mode_renders_each_chunk_on_a_line() {
        let mut buffer = LineBuffer::new(RenderMode::Hex, Newline::Crlf);
        assert_eq!(text(buffer.process(b"hi\r")), "68 69 0D\n");
        assert_eq!(text(buffer.process(b"\n")), "0A\n");
        assert_eq!(buffer.rendered(), "68 69 0D\n0A\n");
    }

    #[test]
    fn test_mode_switch_keeps_rendered_text() {
        let mut buffer = LineBuffer::default();
        buffer.process(b"AB\r");
        buffer.set_mode(RenderMode::Hex);
        assert!(!buffer.pending_carriage_return());
        buffer.process(b"\n");
        assert_eq!(buffer.rendered(), "AB^M0A\n");
    }

    #[test]
    fn test_lf_newline_shows_carriage_returns() {
        let mut buffer = LineBuffer::new(RenderMode::Text, Newline::Lf);
        assert_eq!(text(buffer.process(b"a\r\nb")), "a^M\nb");
        assert!(!buffer.pending_carriage_return());
    }

    #[test]
    fn test_no_newline_escapes_line_feed() {
        let mut buffer = LineBuffer::new(RenderMode::Text, Newline::None);
        assert_eq!(text(buffer.process(b"a\nb\x01")), "a^Jb^A");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::default();
        assert_eq!(text(buffer.process(&[b'a', 0xFF, b'b'])), "a\u{FFFD}b");
    }

    #[test]
    fn test_history_is_bounded() {
        let mut buffer = LineBuffer::default().with_max_rendered(64);
        for _ in 0..50 {
            buffer.process(b"0123456789\r\n");
        }
        assert!(buffer.rendered().len() <= 64);
        assert!(buffer.rendered().ends_with("0123456789\n"));
    }

    #[test]
    fn test_split_crlf_corrected_after_trim() {
        let mut buffer = LineBuffer::default().with_max_rendered(64);
        buffer.process(&[b'x'; 200]);
        buffer.process(b"\r");
        let update = buffer.process(b"\nend").unwrap();
        assert_eq!(update.retract, 2);

        let rendered = buffer.rendered();
        assert!(rendered.len() <= 64);
        assert!(rendered.ends_with("x\nend"));
        assert!(!rendered.contains("^M"));
    }

    #[test]
    fn test_trim_respects_char_boundaries() {
        let mut buffer = LineBuffer::default().with_max_rendered(64);
        for _ in 0..40 {
            buffer.process("é".as_bytes());
        }
        assert!(buffer.rendered().len() <= 64);
        assert!(buffer.rendered().chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_history_bound_has_floor() {
        let buffer = LineBuffer::default().with_max_rendered(1);
        assert_eq!(buffer.max_rendered(), 64);
    }

    #[test]
    fn test_apply_to_stops_at_start() {
        let mut out = String::from("x");
        RenderedText {
            retract: 2,
            text: "y".to_string(),
        }
        .apply_to(&mut out);
        assert_eq!(out, "y");
    }
}
