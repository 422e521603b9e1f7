//! The read and write pipelines, and the state they share: the
//! installed epoch, its keys, the replay window, and the deferred
//! queue that buffers next-epoch records until a handshake in
//! progress finishes installing new keys.
//!
//! The read side is fed, not owned: a caller hands whole datagrams to
//! `receive_datagram` and polls `poll_record` for what came out of
//! them, the same pull shape the workspace's `Endpoint` uses for
//! `poll_transmit` rather than blocking on an owned socket. A
//! `RecordLayer` serves one direction: a connection pairs a
//! `Direction::Read` instance with a `Direction::Write` one, and drives
//! `install_next_epoch_keys` on each independently as key schedule
//! updates land.

use std::collections::{HashMap, VecDeque};

use log::{debug, trace};
use subtle::ConstantTimeEq;

use crate::alert::AlertDescription;
use crate::config::{Direction, RecordLayerConfig};
use crate::content::{Content, ContentType};
use crate::crypto::{CipherProtection, Compressor, MacAlgorithm, MacMode};
use crate::deferred::{self, DeferredRecord, DeferredRecordQueue};
use crate::epoch::{self, Route};
use crate::error::{Error, Result};
use crate::header::{ProtocolVersion, RecordHeader, HEADER_SIZE};
use crate::pending_write::PendingWrite;
use crate::replay::{ReplayStatus, ReplayWindow};
use crate::transport::{Transport, TransportReliability, WriteOutcome};

/// A record delivered to the caller: framing stripped, decrypted,
/// decompressed, authenticated, and decoded into its typed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub epoch: u16,
    pub sequence_number: u64,
    pub content: Content,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    Record(Record),
    WouldBlock,
    Fatal(AlertDescription, Error),
}

/// A single outbound write. `write_records` rejects anything but a
/// one-element slice: batching several templates into one call would
/// need to pick an ordering for their sequence numbers, and nothing
/// upstream of this crate is allowed to do that.
pub struct WriteTemplate<'a> {
    pub content_type: ContentType,
    pub payload: &'a [u8],
}

struct EpochKeys {
    cipher: Box<dyn CipherProtection>,
    mac: Option<Box<dyn MacAlgorithm>>,
}

impl EpochKeys {
    fn new(cipher: Box<dyn CipherProtection>, mac: Option<Box<dyn MacAlgorithm>>) -> Result<Self> {
        if cipher.mac_mode() != MacMode::Aead && mac.is_none() {
            return Err(Error::MacAlgorithmUnset);
        }
        Ok(Self { cipher, mac })
    }
}

enum Step {
    Drop,
    Outcome(PipelineOutcome),
}

const MAX_SEQUENCE_NUMBER: u64 = (1u64 << 48) - 1;

pub struct RecordLayer {
    config: RecordLayerConfig,

    current_epoch: u16,
    current_keys: EpochKeys,
    current_window: ReplayWindow,
    compressor: Box<dyn Compressor>,
    negotiated_version: Option<ProtocolVersion>,
    is_first_record: bool,
    in_init: bool,

    // Next-epoch records seen while `in_init` is true, keyed by
    // (epoch, seq); buffered as raw ciphertext bodies next to their
    // headers until a matching `install_next_epoch_keys` call.
    unprocessed: DeferredRecordQueue,
    unprocessed_epoch: u16,
    // Freshness window for the next epoch, consulted only while
    // buffering: rejects stale or duplicate next-epoch candidates
    // before they ever reach the queue, rather than relying solely on
    // the queue's exact-priority dedup. Reset alongside `current_window`
    // whenever keys install, since the new epoch starts a fresh window.
    next_window: ReplayWindow,
    // Records drained out of `unprocessed` by `install_next_epoch_keys`,
    // waiting to be run back through the normal decrypt path.
    reprocess: VecDeque<DeferredRecord>,

    // Datagrams handed to `receive_datagram`, each kept as a whole unit:
    // DTLS records never span a datagram boundary, so a datagram that
    // doesn't hold a complete record is truncated or malformed, and its
    // remaining bytes are discarded rather than glued onto whatever
    // arrives next.
    datagrams: VecDeque<Vec<u8>>,
    current: Option<(Vec<u8>, usize)>,

    write_seq: HashMap<u16, u64>,
    pending_write: PendingWrite,
    pending_template: Option<(ContentType, Vec<u8>)>,
    pending_wire: Option<Vec<u8>>,
}

impl RecordLayer {
    pub fn new(
        config: RecordLayerConfig,
        initial_cipher: Box<dyn CipherProtection>,
        initial_mac: Option<Box<dyn MacAlgorithm>>,
        compressor: Box<dyn Compressor>,
    ) -> Result<Self> {
        let current_epoch = config.initial_epoch;
        let current_keys = EpochKeys::new(initial_cipher, initial_mac)?;
        Ok(Self {
            current_epoch,
            current_keys,
            current_window: ReplayWindow::new(),
            compressor,
            negotiated_version: None,
            is_first_record: true,
            in_init: true,
            unprocessed: DeferredRecordQueue::new(),
            unprocessed_epoch: current_epoch,
            next_window: ReplayWindow::new(),
            reprocess: VecDeque::new(),
            datagrams: VecDeque::new(),
            current: None,
            write_seq: HashMap::new(),
            pending_write: PendingWrite::new(),
            pending_template: None,
            pending_wire: None,
            config,
        })
    }

    pub fn current_epoch(&self) -> u16 {
        self.current_epoch
    }

    /// Whether a handshake (initial or renegotiated) is in progress.
    /// While true, next-epoch records are buffered instead of dropped.
    pub fn set_in_init(&mut self, in_init: bool) {
        self.in_init = in_init;
    }

    pub fn set_negotiated_version(&mut self, version: ProtocolVersion) {
        self.negotiated_version = Some(version);
    }

    /// Advance to the next epoch with newly derived keys, and replay
    /// any buffered records that were waiting for them.
    pub fn install_next_epoch_keys(
        &mut self,
        cipher: Box<dyn CipherProtection>,
        mac: Option<Box<dyn MacAlgorithm>>,
    ) -> Result<()> {
        let keys = EpochKeys::new(cipher, mac)?;
        self.current_epoch = self.current_epoch.wrapping_add(1);
        self.current_keys = keys;
        self.current_window = ReplayWindow::new();
        self.next_window = ReplayWindow::new();
        debug!("installed keys for epoch {}", self.current_epoch);

        if self.unprocessed_epoch == self.current_epoch {
            let mut reprocess = std::mem::take(&mut self.reprocess);
            self.unprocessed.drain_to(|dr| reprocess.push_back(dr));
            debug!(
                "moved {} buffered record(s) for epoch {} into reprocessing",
                reprocess.len(),
                self.current_epoch
            );
            self.reprocess = reprocess;
        }
        Ok(())
    }

    /// Hand off every still-buffered record -- drained from the
    /// deferred queue, the reprocess backlog, and any datagram bytes
    /// not yet parsed -- to `sink`, then discard this record layer.
    /// Used when a connection migrates to a successor and nothing
    /// already in flight may be silently lost. Buffered next-epoch
    /// records are re-marshaled in non-decreasing `(epoch, seq)` order;
    /// unparsed datagram bytes are forwarded as-is for the successor to
    /// parse itself.
    pub fn close(mut self, mut sink: impl FnMut(Vec<u8>)) {
        let mut backlog: Vec<DeferredRecord> = Vec::new();
        self.unprocessed.drain_to(|dr| backlog.push(dr));
        backlog.extend(self.reprocess.drain(..));
        backlog.sort_by_key(|dr| deferred::priority(dr.header.epoch, dr.header.sequence_number));
        debug!("closing record layer, migrating {} buffered record(s)", backlog.len());

        for dr in backlog {
            let mut wire = Vec::with_capacity(HEADER_SIZE + dr.raw.len());
            dr.header.marshal(&mut wire);
            wire.extend_from_slice(&dr.raw);
            sink(wire);
        }

        if let Some((buf, pos)) = self.current.take() {
            if pos < buf.len() {
                sink(buf[pos..].to_vec());
            }
        }
        for datagram in self.datagrams.drain(..) {
            sink(datagram);
        }
    }

    // ---- read path ----

    pub fn receive_datagram(&mut self, datagram: &[u8]) {
        assert_eq!(
            self.config.direction,
            Direction::Read,
            "receive_datagram called on a write-direction record layer"
        );
        if !datagram.is_empty() {
            self.datagrams.push_back(datagram.to_vec());
        }
    }

    pub fn poll_record(&mut self) -> PipelineOutcome {
        assert_eq!(
            self.config.direction,
            Direction::Read,
            "poll_record called on a write-direction record layer"
        );
        loop {
            match self.poll_one() {
                Step::Drop => continue,
                Step::Outcome(outcome) => return outcome,
            }
        }
    }

    fn poll_one(&mut self) -> Step {
        if let Some(dr) = self.reprocess.pop_front() {
            return self.process_record(dr.header, dr.raw);
        }

        if self.current.is_none() {
            match self.datagrams.pop_front() {
                Some(d) => self.current = Some((d, 0)),
                None => return Step::Outcome(PipelineOutcome::WouldBlock),
            }
        }

        let (buf, pos) = self.current.take().expect("checked above");
        if pos >= buf.len() {
            return Step::Drop;
        }

        if buf.len() - pos < HEADER_SIZE {
            trace!("datagram ends with a truncated record header, dropping the remainder");
            return Step::Drop;
        }

        let header = match RecordHeader::parse(&buf[pos..pos + HEADER_SIZE]) {
            Ok(h) => h,
            Err(_) => {
                trace!("unparsable record header, dropping the rest of the datagram");
                return Step::Drop;
            }
        };

        let body_start = pos + HEADER_SIZE;
        let body_len = header.length as usize;

        if buf.len() - body_start < body_len {
            trace!(
                "record body truncated (want {} have {}), dropping the rest of the datagram",
                body_len,
                buf.len() - body_start
            );
            return Step::Drop;
        }

        let validated = header.validate(
            self.is_first_record,
            self.config.protocol_version.major,
            self.negotiated_version,
            self.config.max_fragment_len,
            self.config.overhead_budget,
        );
        self.is_first_record = false;

        let next_pos = body_start + body_len;
        let body = buf[body_start..next_pos].to_vec();
        if next_pos < buf.len() {
            self.current = Some((buf, next_pos));
        }

        match validated {
            Ok(()) => {}
            Err(Error::Fatal(desc, reason)) => {
                debug!("fatal alert {:?}: {}", desc, reason);
                return Step::Outcome(PipelineOutcome::Fatal(desc, Error::Fatal(desc, reason)));
            }
            Err(_) => {
                trace!("record failed header validation, dropping just this record");
                return Step::Drop;
            }
        }

        if body_len == 0 {
            return Step::Drop;
        }

        let unprocessed_matches_current =
            self.unprocessed.is_empty() || self.unprocessed_epoch == self.current_epoch.wrapping_add(1);

        match epoch::route(
            self.current_epoch,
            header.epoch,
            header.content_type,
            unprocessed_matches_current,
        ) {
            None => {
                trace!("record epoch {} has no valid route, dropping", header.epoch);
                Step::Drop
            }
            Some(Route::Current) => self.process_record(header, body),
            Some(Route::Next) => {
                if !self.in_init {
                    return Step::Drop;
                }
                match self.next_window.check(header.sequence_number) {
                    ReplayStatus::Duplicate | ReplayStatus::Stale => {
                        trace!(
                            "stale/duplicate next-epoch candidate epoch={} seq={}, dropping",
                            header.epoch,
                            header.sequence_number
                        );
                        return Step::Drop;
                    }
                    ReplayStatus::Fresh => {}
                }
                if self.unprocessed.len() >= deferred::MAX_QUEUE_LEN {
                    return Step::Outcome(PipelineOutcome::Fatal(
                        AlertDescription::InternalError,
                        Error::fatal(AlertDescription::InternalError, "deferred record queue full"),
                    ));
                }
                self.unprocessed_epoch = header.epoch;
                let prio = deferred::priority(header.epoch, header.sequence_number);
                if self.unprocessed.insert(prio, DeferredRecord { header, raw: body }) {
                    self.next_window.update(header.sequence_number);
                    debug!(
                        "buffered next-epoch record epoch={} seq={} ({} queued)",
                        header.epoch,
                        header.sequence_number,
                        self.unprocessed.len()
                    );
                }
                Step::Drop
            }
        }
    }

    /// Authenticate, decrypt, decompress and deliver a record already
    /// routed to the current epoch, whether it just arrived or was
    /// pulled back out of the deferred queue after an epoch install.
    fn process_record(&mut self, header: RecordHeader, body: Vec<u8>) -> Step {
        let reliable = self.config.transport_reliability == TransportReliability::ReliableOrdered;

        if !reliable {
            match self.current_window.check(header.sequence_number) {
                ReplayStatus::Duplicate | ReplayStatus::Stale => {
                    trace!(
                        "replayed record epoch={} seq={}, dropping",
                        header.epoch,
                        header.sequence_number
                    );
                    return Step::Drop;
                }
                ReplayStatus::Fresh => {}
            }
        }

        let mac_mode = self.current_keys.cipher.mac_mode();

        let decrypted = match mac_mode {
            MacMode::EncryptThenMac => {
                let mac = self
                    .current_keys
                    .mac
                    .as_ref()
                    .expect("ETM cipher always installed with a MAC");
                let mac_size = mac.mac_size();
                if body.len() < mac_size {
                    return Step::Outcome(PipelineOutcome::Fatal(
                        AlertDescription::DecodeError,
                        Error::fatal(AlertDescription::DecodeError, "encrypt-then-mac body shorter than the MAC"),
                    ));
                }
                let (ciphertext, tag) = body.split_at(body.len() - mac_size);
                let expected = mac.compute(&header, ciphertext);
                if expected.ct_eq(tag).unwrap_u8() != 1 {
                    return Step::Outcome(PipelineOutcome::Fatal(
                        AlertDescription::BadRecordMac,
                        Error::fatal(AlertDescription::BadRecordMac, "encrypt-then-mac verification failed"),
                    ));
                }
                match self.current_keys.cipher.decrypt(&header, ciphertext) {
                    Ok(p) => p,
                    Err(_) => {
                        return Step::Outcome(PipelineOutcome::Fatal(
                            AlertDescription::InternalError,
                            Error::fatal(
                                AlertDescription::InternalError,
                                "decrypt failed after encrypt-then-mac verification passed",
                            ),
                        ))
                    }
                }
            }
            MacMode::Aead | MacMode::MacThenEncrypt => match self.current_keys.cipher.decrypt(&header, &body) {
                Ok(p) => p,
                Err(_) => {
                    trace!("decrypt failed for epoch={} seq={}, dropping", header.epoch, header.sequence_number);
                    return Step::Drop;
                }
            },
        };

        let plaintext = match mac_mode {
            MacMode::MacThenEncrypt => {
                let mac = self
                    .current_keys
                    .mac
                    .as_ref()
                    .expect("MtE cipher always installed with a MAC");
                let mac_size = mac.mac_size();
                if decrypted.len() < mac_size {
                    return Step::Drop;
                }
                if header.length as usize > crate::header::MAX_COMPRESSED + mac_size {
                    return Step::Drop;
                }
                let (plaintext, tag) = decrypted.split_at(decrypted.len() - mac_size);
                let expected = mac.compute(&header, plaintext);
                if expected.ct_eq(tag).unwrap_u8() != 1 {
                    trace!(
                        "mac-then-encrypt mismatch for epoch={} seq={}, dropping",
                        header.epoch,
                        header.sequence_number
                    );
                    return Step::Drop;
                }
                plaintext.to_vec()
            }
            _ => decrypted,
        };

        let decompressed = match self.compressor.decompress(&plaintext) {
            Ok(d) => d,
            Err(_) => {
                return Step::Outcome(PipelineOutcome::Fatal(
                    AlertDescription::DecompressionFailure,
                    Error::fatal(AlertDescription::DecompressionFailure, "decompression failed"),
                ))
            }
        };
        if decompressed.len() > crate::header::MAX_COMPRESSED || decompressed.len() > self.config.max_fragment_len {
            return Step::Outcome(PipelineOutcome::Fatal(
                AlertDescription::RecordOverflow,
                Error::fatal(AlertDescription::RecordOverflow, "fragment exceeds negotiated length"),
            ));
        }

        let content = match Content::decode(header.content_type, &decompressed) {
            Ok(c) => c,
            Err(Error::Fatal(desc, reason)) => {
                debug!("fatal alert {:?}: {}", desc, reason);
                return Step::Outcome(PipelineOutcome::Fatal(desc, Error::Fatal(desc, reason)));
            }
            Err(e) => return Step::Outcome(PipelineOutcome::Fatal(AlertDescription::DecodeError, e)),
        };

        if !reliable {
            self.current_window.update(header.sequence_number);
        }

        Step::Outcome(PipelineOutcome::Record(Record {
            epoch: header.epoch,
            sequence_number: header.sequence_number,
            content,
        }))
    }

    // ---- write path ----

    pub fn write_records(
        &mut self,
        templates: &[WriteTemplate],
        transport: &mut dyn Transport,
    ) -> Result<WriteOutcome> {
        assert_eq!(
            self.config.direction,
            Direction::Write,
            "write_records called on a read-direction record layer"
        );
        if templates.len() != 1 {
            return Err(Error::BatchedWriteRejected);
        }
        let template = &templates[0];
        self.write_record(template.content_type, template.payload, transport)
    }

    fn write_record(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
        transport: &mut dyn Transport,
    ) -> Result<WriteOutcome> {
        match &self.pending_template {
            Some((pending_type, pending_payload)) => {
                if *pending_type != content_type || pending_payload.as_slice() != payload {
                    return Err(Error::BadWriteRetry);
                }
            }
            None => {
                let wire = self.encode_record(content_type, payload)?;
                self.pending_template = Some((content_type, payload.to_vec()));
                self.pending_wire = Some(wire);
            }
        }

        let wire = self.pending_wire.clone().expect("built above");
        let outcome = self.pending_write.send(transport, content_type, &wire)?;
        if outcome == WriteOutcome::Sent {
            self.pending_template = None;
            self.pending_wire = None;
        }
        Ok(outcome)
    }

    fn encode_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<Vec<u8>> {
        let sequence_number = self.next_write_sequence_number()?;
        let mut header = RecordHeader {
            content_type,
            version: self.negotiated_version.unwrap_or(self.config.protocol_version),
            epoch: self.current_epoch,
            sequence_number,
            length: 0,
        };

        let compressed = self.compressor.compress(payload);
        let mac_mode = self.current_keys.cipher.mac_mode();

        let body = match mac_mode {
            MacMode::MacThenEncrypt => {
                let mac = self.current_keys.mac.as_ref().ok_or(Error::MacAlgorithmUnset)?;
                let tag = mac.compute(&header, &compressed);
                let mut plaintext = compressed;
                plaintext.extend_from_slice(&tag);
                self.current_keys.cipher.encrypt(&header, &plaintext)?
            }
            MacMode::Aead => self.current_keys.cipher.encrypt(&header, &compressed)?,
            MacMode::EncryptThenMac => {
                let mac = self.current_keys.mac.as_ref().ok_or(Error::MacAlgorithmUnset)?;
                let ciphertext = self.current_keys.cipher.encrypt(&header, &compressed)?;
                let tag = mac.compute(&header, &ciphertext);
                let mut out = ciphertext;
                out.extend_from_slice(&tag);
                out
            }
        };

        if body.len() > u16::MAX as usize {
            return Err(Error::RecordTooLarge(body.len()));
        }
        header.length = body.len() as u16;

        let mut wire = Vec::with_capacity(HEADER_SIZE + body.len());
        header.marshal(&mut wire);
        wire.extend_from_slice(&body);
        Ok(wire)
    }

    fn next_write_sequence_number(&mut self) -> Result<u64> {
        let counter = self.write_seq.entry(self.current_epoch).or_insert(0);
        if *counter > MAX_SEQUENCE_NUMBER {
            return Err(Error::SequenceNumberOverflow);
        }
        let seq = *counter;
        *counter += 1;
        Ok(seq)
    }
}
