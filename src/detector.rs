//! Frame detection state machine.
//!
//! A [`FrameDetector`] runs against one [`RingBuffer`] and pulls out every
//! frame that the buffered bytes complete. Bytes belonging to an incomplete
//! frame stay in the buffer untouched and are retried on the next call, so
//! splitting a stream into arbitrary chunks yields the same frames as
//! feeding it whole.
//!
//! # Detection modes
//!
//! ```text
//! EndDelimiterOnly      payload FINISH [trailer]
//! StartAndEndDelimiter  noise START payload FINISH [trailer]
//! NoDelimiters          payload(fixed length) [trailer]
//! StartDelimiterOnly    noise START payload [trailer] START ...
//! ```
//!
//! In QuickPlot operation mode `\r\n`, `\n` and `\r` also end a frame; the
//! earliest match wins, and the longest delimiter wins a tie.
//!
//! Frames with an empty payload are skipped. A checksum mismatch does not
//! drop the frame: it is emitted with `checksum_valid == false`.
//!
//! # Example
//!
//! ```
//! use streamframe::buffer::RingBuffer;
//! use streamframe::config::FrameConfig;
//! use streamframe::detector::FrameDetector;
//!
//! let mut buffer = RingBuffer::new(64);
//! let mut detector = FrameDetector::new(FrameConfig::start_end("<", ">"));
//!
//! buffer.append(b"garbage<A>junk<B").unwrap();
//! let frames = detector.extract(&mut buffer).unwrap();
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), b"A");
//!
//! buffer.append(b">").unwrap();
//! let frames = detector.extract(&mut buffer).unwrap();
//! assert_eq!(frames[0].payload(), b"B");
//! assert_eq!(frames[0].sequence, 1);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::buffer::{Pattern, RingBuffer};
use crate::config::{FrameConfig, FrameDetection, OperationMode};
use crate::error::{Result, StreamError};
use crate::protocol::Frame;

/// Line endings accepted in QuickPlot mode, longest first.
const LINE_ENDINGS: [&[u8]; 3] = [b"\r\n", b"\n", b"\r"];

/// Outcome of one extraction attempt.
enum Step {
    Frame(Frame),
    /// Bytes were consumed without producing a frame.
    Skipped,
    NeedMore,
}

/// Per-worker frame extraction state.
#[derive(Debug)]
pub struct FrameDetector {
    config: FrameConfig,
    checksum_len: usize,
    start: Pattern,
    end_patterns: Vec<Pattern>,
    max_end_len: usize,
    /// Next sequence number to assign.
    sequence: u64,
    /// Offset below which the current search already failed.
    scan_from: usize,
    /// Bytes up to the first end delimiter belong to a frame started elsewhere.
    resync: bool,
}

impl FrameDetector {
    /// Create a detector; delimiter failure tables are built here once.
    pub fn new(config: FrameConfig) -> Self {
        let mut detector = Self {
            config: FrameConfig::default(),
            checksum_len: 0,
            start: Pattern::default(),
            end_patterns: Vec::new(),
            max_end_len: 0,
            sequence: 0,
            scan_from: 0,
            resync: false,
        };
        detector.configure(config);
        detector
    }

    /// Swap in a new configuration. The sequence counter keeps running.
    pub fn configure(&mut self, config: FrameConfig) {
        let mut end_patterns = Vec::with_capacity(LINE_ENDINGS.len() + 1);
        if !config.finish_sequence.is_empty() {
            end_patterns.push(Pattern::new(config.finish_sequence.clone()));
        }
        if config.operation_mode == OperationMode::QuickPlot {
            for ending in LINE_ENDINGS {
                if ending != config.finish_sequence.as_ref() {
                    end_patterns.push(Pattern::new(Bytes::from_static(ending)));
                }
            }
        }

        self.checksum_len = config.checksum_algorithm.length();
        self.start = Pattern::new(config.start_sequence.clone());
        self.max_end_len = end_patterns.iter().map(Pattern::len).max().unwrap_or(0);
        self.end_patterns = end_patterns;
        self.config = config;
        self.scan_from = 0;
    }

    #[inline]
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Sequence number the next frame will carry.
    #[inline]
    pub fn next_sequence(&self) -> u64 {
        self.sequence
    }

    /// Restart sequence numbering and forget search progress.
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.scan_from = 0;
        self.resync = false;
    }

    /// Treat the next bytes as the middle of a frame.
    ///
    /// In end-delimited modes everything up to and including the first end
    /// delimiter (and its trailer) is dropped before detection resumes.
    /// Start-delimited modes already drop bytes before a start sequence.
    /// Fixed-length frames carry no marker to realign on.
    pub fn resync(&mut self) {
        self.resync = true;
        self.scan_from = 0;
    }

    /// True until a pending [`resync`](Self::resync) found its end delimiter.
    #[inline]
    pub fn is_resyncing(&self) -> bool {
        self.resync
    }

    /// Forget search progress after the buffer was cleared externally.
    pub(crate) fn reset_search(&mut self) {
        self.scan_from = 0;
    }

    /// Extract every frame the buffered bytes complete, in stream order.
    pub fn extract(&mut self, buffer: &mut RingBuffer) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        if self.resync && !self.skip_partial_frame(buffer)? {
            return Ok(frames);
        }
        loop {
            let step = match self.config.frame_detection_mode {
                FrameDetection::EndDelimiterOnly => self.end_delimited(buffer)?,
                FrameDetection::StartAndEndDelimiter => self.start_end_delimited(buffer)?,
                FrameDetection::NoDelimiters => self.fixed_length(buffer)?,
                FrameDetection::StartDelimiterOnly => self.start_delimited(buffer)?,
            };
            match step {
                Step::Frame(frame) => frames.push(frame),
                Step::Skipped => continue,
                Step::NeedMore => break,
            }
        }
        Ok(frames)
    }

    /// Extract complete frames, then finalize a pending start-delimited
    /// frame that is only waiting for the next start sequence.
    pub fn flush(&mut self, buffer: &mut RingBuffer) -> Result<Vec<Frame>> {
        let mut frames = self.extract(buffer)?;
        if self.config.frame_detection_mode != FrameDetection::StartDelimiterOnly
            || self.start.is_empty()
        {
            return Ok(frames);
        }

        let slen = self.start.len();
        if let Some(start) = buffer.find_pattern(&self.start) {
            buffer.discard(start)?;
            buffer.discard(slen)?;
            let body = buffer.read(buffer.len())?;
            self.scan_from = 0;
            if let Step::Frame(frame) = self.split_trailer(body) {
                frames.push(frame);
            }
        }
        Ok(frames)
    }

    /// Earliest end delimiter at or after `scan_from` as `(position, length)`.
    fn find_end(&mut self, buffer: &RingBuffer) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for pattern in &self.end_patterns {
            if let Some(pos) = buffer.find_pattern_from(pattern, self.scan_from) {
                let better = match best {
                    None => true,
                    Some((best_pos, best_len)) => {
                        pos < best_pos || (pos == best_pos && pattern.len() > best_len)
                    }
                };
                if better {
                    best = Some((pos, pattern.len()));
                }
            }
        }

        match best {
            None => {
                self.scan_from = buffer.len().saturating_sub(self.max_end_len.saturating_sub(1));
                None
            }
            Some((pos, len)) if buffer.len() < pos + len + self.checksum_len => {
                self.scan_from = pos;
                None
            }
            found => found,
        }
    }

    /// Drop the tail of a frame whose beginning never reached this detector.
    ///
    /// Returns `false` while that tail is not complete.
    fn skip_partial_frame(&mut self, buffer: &mut RingBuffer) -> Result<bool> {
        if self.config.frame_detection_mode == FrameDetection::EndDelimiterOnly {
            let Some((pos, delimiter_len)) = self.find_end(buffer) else {
                return Ok(false);
            };
            let skipped = pos + delimiter_len + self.checksum_len;
            buffer.discard(skipped)?;
            self.scan_from = 0;
            tracing::debug!("Resynchronized after dropping {} bytes", skipped);
        }
        self.resync = false;
        Ok(true)
    }

    fn end_delimited(&mut self, buffer: &mut RingBuffer) -> Result<Step> {
        let Some((pos, delimiter_len)) = self.find_end(buffer) else {
            return Ok(Step::NeedMore);
        };

        let payload = buffer.read(pos)?;
        buffer.discard(delimiter_len)?;
        let trailer = buffer.read(self.checksum_len)?;
        self.scan_from = 0;
        Ok(self.emit(payload, &trailer))
    }

    fn start_end_delimited(&mut self, buffer: &mut RingBuffer) -> Result<Step> {
        let elen = self.end_patterns.first().map_or(0, Pattern::len);
        if elen == 0 || self.start.is_empty() || !self.skip_to_start(buffer)? {
            return Ok(Step::NeedMore);
        }
        let slen = self.start.len();

        let from = self.scan_from.max(slen);
        let found = self
            .end_patterns
            .first()
            .and_then(|end| buffer.find_pattern_from(end, from));
        let Some(end_pos) = found else {
            self.scan_from = buffer.len().saturating_sub(elen - 1).max(slen);
            return Ok(Step::NeedMore);
        };
        if buffer.len() < end_pos + elen + self.checksum_len {
            self.scan_from = end_pos;
            return Ok(Step::NeedMore);
        }

        buffer.discard(slen)?;
        let payload = buffer.read(end_pos - slen)?;
        buffer.discard(elen)?;
        let trailer = buffer.read(self.checksum_len)?;
        self.scan_from = 0;
        Ok(self.emit(payload, &trailer))
    }

    fn fixed_length(&mut self, buffer: &mut RingBuffer) -> Result<Step> {
        let length = self.config.fixed_frame_length;
        if length == 0 || buffer.len() < length + self.checksum_len {
            return Ok(Step::NeedMore);
        }

        let payload = buffer.read(length)?;
        let trailer = buffer.read(self.checksum_len)?;
        Ok(self.emit(payload, &trailer))
    }

    fn start_delimited(&mut self, buffer: &mut RingBuffer) -> Result<Step> {
        if self.start.is_empty() || !self.skip_to_start(buffer)? {
            return Ok(Step::NeedMore);
        }
        let slen = self.start.len();

        let from = self.scan_from.max(slen);
        let Some(next) = buffer.find_pattern_from(&self.start, from) else {
            self.scan_from = buffer.len().saturating_sub(slen - 1).max(slen);
            return Ok(Step::NeedMore);
        };

        buffer.discard(slen)?;
        let body = buffer.read(next - slen)?;
        self.scan_from = 0;
        Ok(self.split_trailer(body))
    }

    /// Drop noise so the buffer starts with the start sequence.
    ///
    /// Returns `false` when no start sequence is buffered; only a tail that
    /// could still begin one is kept.
    fn skip_to_start(&mut self, buffer: &mut RingBuffer) -> Result<bool> {
        match buffer.find_pattern(&self.start) {
            Some(0) => Ok(true),
            Some(pos) => {
                buffer.discard(pos)?;
                self.scan_from = 0;
                Ok(true)
            }
            None => {
                let keep = self.start.len() - 1;
                buffer.discard(buffer.len().saturating_sub(keep))?;
                self.scan_from = 0;
                Ok(false)
            }
        }
    }

    /// Treat the tail of a start-delimited frame body as its trailer.
    fn split_trailer(&mut self, body: Bytes) -> Step {
        if body.len() < self.checksum_len {
            tracing::debug!(
                "Dropping {} byte frame shorter than its {} byte trailer",
                body.len(),
                self.checksum_len
            );
            return Step::Skipped;
        }
        let split = body.len() - self.checksum_len;
        let payload = body.slice(..split);
        let trailer = body.slice(split..);
        self.emit(payload, &trailer)
    }

    fn emit(&mut self, payload: Bytes, trailer: &[u8]) -> Step {
        if payload.is_empty() {
            return Step::Skipped;
        }

        let checksum_valid = self.config.checksum_algorithm.verify(&payload, trailer);
        if !checksum_valid {
            tracing::trace!("Checksum mismatch on frame {}", self.sequence);
        }

        let frame = Frame::new(payload, self.sequence, checksum_valid);
        self.sequence += 1;
        Step::Frame(frame)
    }
}

/// Build the on-wire bytes of one frame: delimiters plus checksum trailer.
///
/// # Errors
///
/// `Configuration` if the payload cannot be framed under `config`: a
/// required delimiter is empty, or the payload length differs from the
/// fixed frame length.
pub fn encode_frame(config: &FrameConfig, payload: &[u8]) -> Result<Bytes> {
    let trailer = config.checksum_algorithm.digest(payload);
    let start = config.start_sequence.as_ref();
    let finish: &[u8] = if config.finish_sequence.is_empty()
        && config.operation_mode == OperationMode::QuickPlot
    {
        b"\n"
    } else {
        config.finish_sequence.as_ref()
    };

    let mut out = BytesMut::with_capacity(
        start.len() + payload.len() + finish.len() + trailer.len(),
    );
    match config.frame_detection_mode {
        FrameDetection::EndDelimiterOnly => {
            require(!finish.is_empty(), "finish sequence is empty")?;
            out.put_slice(payload);
            out.put_slice(finish);
        }
        FrameDetection::StartAndEndDelimiter => {
            require(!start.is_empty() && !finish.is_empty(), "delimiter is empty")?;
            out.put_slice(start);
            out.put_slice(payload);
            out.put_slice(finish);
        }
        FrameDetection::NoDelimiters => {
            require(
                payload.len() == config.fixed_frame_length,
                "payload length differs from fixed frame length",
            )?;
            out.put_slice(payload);
        }
        FrameDetection::StartDelimiterOnly => {
            require(!start.is_empty(), "start sequence is empty")?;
            out.put_slice(start);
            out.put_slice(payload);
        }
    }
    out.put_slice(&trailer);
    Ok(out.freeze())
}

fn require(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(StreamError::Configuration(message.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;

    fn run(config: FrameConfig, chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut buffer = RingBuffer::new(1024);
        let mut detector = FrameDetector::new(config);
        let mut out = Vec::new();
        for chunk in chunks {
            buffer.append(chunk).unwrap();
            for frame in detector.extract(&mut buffer).unwrap() {
                out.push(frame.payload().to_vec());
            }
        }
        out
    }

    fn strings(frames: &[Vec<u8>]) -> Vec<&str> {
        frames
            .iter()
            .map(|f| std::str::from_utf8(f).unwrap())
            .collect()
    }

    #[test]
    fn test_end_delimiter_lines() {
        let frames = run(FrameConfig::end_delimited("\n"), &[b"frame1\nframe2\nframe3\n"]);
        assert_eq!(strings(&frames), ["frame1", "frame2", "frame3"]);
    }

    #[test]
    fn test_end_delimiter_across_chunks() {
        let frames = run(FrameConfig::end_delimited("\n"), &[b"frame1\nfra", b"me2\n"]);
        assert_eq!(strings(&frames), ["frame1", "frame2"]);
    }

    #[test]
    fn test_multibyte_delimiter_split_across_chunks() {
        let frames = run(
            FrameConfig::end_delimited("\r\n"),
            &[b"alpha\r", b"\nbeta", b"\r", b"\n"],
        );
        assert_eq!(strings(&frames), ["alpha", "beta"]);
    }

    #[test]
    fn test_fixed_length() {
        let frames = run(FrameConfig::fixed_length(10), &[b"1234567890abcdefghij"]);
        assert_eq!(strings(&frames), ["1234567890", "abcdefghij"]);
    }

    #[test]
    fn test_fixed_length_waits_for_full_frame() {
        let frames = run(FrameConfig::fixed_length(4), &[b"ab", b"cdef", b"gh"]);
        assert_eq!(strings(&frames), ["abcd", "efgh"]);
    }

    #[test]
    fn test_fixed_length_zero_never_frames() {
        let frames = run(FrameConfig::fixed_length(0), &[b"abcdef"]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_start_end_discards_noise() {
        let frames = run(FrameConfig::start_end("<", ">"), &[b"garbage<A>junk<B>"]);
        assert_eq!(strings(&frames), ["A", "B"]);
    }

    #[test]
    fn test_start_end_noise_is_dropped_from_buffer() {
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(FrameConfig::start_end("$$", "##"));

        buffer.append(b"noise noise $").unwrap();
        assert!(detector.extract(&mut buffer).unwrap().is_empty());
        // Only a possible start prefix survives.
        assert_eq!(&buffer.peek(buffer.len())[..], b"$");

        buffer.append(b"$payload##").unwrap();
        let frames = detector.extract(&mut buffer).unwrap();
        assert_eq!(frames[0].payload(), b"payload");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_start_end_same_delimiter() {
        let frames = run(FrameConfig::start_end("|", "|"), &[b"|A||B|"]);
        assert_eq!(strings(&frames), ["A", "B"]);
    }

    #[test]
    fn test_start_only_waits_for_next_start() {
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(FrameConfig::start_delimited("$"));

        buffer.append(b"xx$one$two$thr").unwrap();
        let frames = detector.extract(&mut buffer).unwrap();
        let payloads: Vec<_> = frames.iter().map(|f| f.payload().to_vec()).collect();
        assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec()]);

        buffer.append(b"ee").unwrap();
        assert!(detector.extract(&mut buffer).unwrap().is_empty());

        let flushed = detector.flush(&mut buffer).unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].payload(), b"three");
        assert_eq!(flushed[0].sequence, 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_flush_is_noop_for_other_modes() {
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(FrameConfig::end_delimited("\n"));
        buffer.append(b"partial").unwrap();
        assert!(detector.flush(&mut buffer).unwrap().is_empty());
        assert_eq!(buffer.len(), 7);
    }

    #[test]
    fn test_quick_plot_line_endings() {
        let frames = run(FrameConfig::default(), &[b"a\r\nb\nc\rd\n"]);
        assert_eq!(strings(&frames), ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_quick_plot_crlf_split_yields_same_frames() {
        let frames = run(FrameConfig::default(), &[b"1,2\r", b"\n3,4\r\n"]);
        assert_eq!(strings(&frames), ["1,2", "3,4"]);
    }

    #[test]
    fn test_empty_payloads_are_skipped() {
        let frames = run(FrameConfig::end_delimited(";"), &[b";;a;;b;"]);
        assert_eq!(strings(&frames), ["a", "b"]);
    }

    #[test]
    fn test_checksum_trailer_waits_for_bytes() {
        let config = FrameConfig::end_delimited("\n").with_checksum("crc16");
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(config.clone());

        let wire = encode_frame(&config, b"hello").unwrap();
        buffer.append(&wire[..wire.len() - 1]).unwrap();
        assert!(detector.extract(&mut buffer).unwrap().is_empty());
        assert_eq!(buffer.len(), wire.len() - 1);

        buffer.append(&wire[wire.len() - 1..]).unwrap();
        let frames = detector.extract(&mut buffer).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(frames[0].checksum_valid);
    }

    #[test]
    fn test_checksum_mismatch_still_emits() {
        let config = FrameConfig::start_end("<", ">").with_checksum("crc8");
        let mut wire = encode_frame(&config, b"data").unwrap().to_vec();
        wire[2] ^= 0x04;

        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(config);
        buffer.append(&wire).unwrap();

        let frames = detector.extract(&mut buffer).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].checksum_valid);
    }

    #[test]
    fn test_start_only_with_checksum() {
        let config = FrameConfig::start_delimited(&b"\xAA\x55"[..]).with_checksum("xor8");
        let mut wire = Vec::new();
        for payload in [&b"first"[..], b"second", b"third"] {
            wire.extend_from_slice(&encode_frame(&config, payload).unwrap());
        }

        let mut buffer = RingBuffer::new(128);
        let mut detector = FrameDetector::new(config);
        buffer.append(&wire).unwrap();

        let mut frames = detector.extract(&mut buffer).unwrap();
        frames.extend(detector.flush(&mut buffer).unwrap());

        let payloads: Vec<_> = frames.iter().map(|f| f.payload().to_vec()).collect();
        assert_eq!(
            payloads,
            vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]
        );
        assert!(frames.iter().all(|f| f.checksum_valid));
    }

    #[test]
    fn test_sequence_increments_and_resets() {
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(FrameConfig::end_delimited("\n"));

        buffer.append(b"a\nb\n").unwrap();
        let frames = detector.extract(&mut buffer).unwrap();
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[1].sequence, 1);
        assert_eq!(detector.next_sequence(), 2);

        detector.reset();
        buffer.append(b"c\n").unwrap();
        assert_eq!(detector.extract(&mut buffer).unwrap()[0].sequence, 0);
    }

    #[test]
    fn test_resync_drops_partial_frame() {
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(FrameConfig::default());
        detector.resync();

        buffer.append(b"1.5").unwrap();
        assert!(detector.extract(&mut buffer).unwrap().is_empty());
        assert!(detector.is_resyncing());

        buffer.append(b"\r\n22.0\n").unwrap();
        let frames = detector.extract(&mut buffer).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"22.0");
        assert_eq!(frames[0].sequence, 0);
        assert!(!detector.is_resyncing());
    }

    #[test]
    fn test_resync_skips_trailer_of_partial_frame() {
        let config = FrameConfig::end_delimited(";").with_checksum("crc8");
        let mut wire = encode_frame(&config, b"lost").unwrap().to_vec();
        wire.extend_from_slice(&encode_frame(&config, b"kept").unwrap());

        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(config);
        detector.resync();
        buffer.append(&wire[2..]).unwrap();

        let frames = detector.extract(&mut buffer).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"kept");
        assert!(frames[0].checksum_valid);
    }

    #[test]
    fn test_resync_in_start_modes_uses_start_sequence() {
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(FrameConfig::start_end("<", ">"));
        detector.resync();

        buffer.append(b"21.5><22.0>").unwrap();
        let frames = detector.extract(&mut buffer).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"22.0");
        assert!(!detector.is_resyncing());
    }

    #[test]
    fn test_reset_cancels_resync() {
        let mut buffer = RingBuffer::new(64);
        let mut detector = FrameDetector::new(FrameConfig::end_delimited("\n"));
        detector.resync();
        detector.reset();

        buffer.append(b"whole\n").unwrap();
        assert_eq!(detector.extract(&mut buffer).unwrap()[0].payload(), b"whole");
    }

    #[test]
    fn test_empty_delimiters_never_frame() {
        assert!(run(FrameConfig::end_delimited(""), &[b"abc\n"]).is_empty());
        assert!(run(FrameConfig::start_end("", ">"), &[b"<a>"]).is_empty());
        assert!(run(FrameConfig::start_delimited(""), &[b"$a$b"]).is_empty());
    }

    #[test]
    fn test_unrecognized_checksum_behaves_like_none() {
        let config = FrameConfig::end_delimited("\n").with_checksum("bogus");
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Unrecognized("bogus".into()));
        let frames = run(config, &[b"abc\n"]);
        assert_eq!(strings(&frames), ["abc"]);
    }

    #[test]
    fn test_encode_frame_rejects_unframeable_payload() {
        assert!(encode_frame(&FrameConfig::fixed_length(4), b"abc").is_err());
        assert!(encode_frame(&FrameConfig::end_delimited(""), b"abc").is_err());
        assert_eq!(
            &encode_frame(&FrameConfig::start_end("<", ">"), b"x").unwrap()[..],
            b"<x>"
        );
    }
}
