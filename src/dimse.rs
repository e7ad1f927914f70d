//! DIMSE message exchange.
//!
//! Builds whole DIMSE messages -- a Command Set together with an optional
//! Data Set -- out of the presentation-data primitives exposed by an
//! established [`Association`](crate::association::Association). Command
//! Sets are always encoded Implicit VR Little Endian, as mandated by the
//! standard; Data Sets are encoded with the transfer syntax negotiated for
//! their presentation context.
//!
//! Large Data Sets are not held in memory as a single buffer before being
//! put on the wire: [`send_command_with_dataset`] and
//! [`send_command_conditional`] stream them through
//! [`send_pdata`](crate::association::SyncAssociation::send_pdata), which
//! transparently splits them across as many P-DATA-TF PDUs as the
//! negotiated maximum PDU length requires.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_encoding::TransferSyntax;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::entries;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::association::{CloseSocket, SyncAssociation};
use crate::pdu::commands::{
    CEchoRq, CFindRq, CGetRq, CMoveRq, CStoreRq,
    CommandDatasetType, CommandField, Command, DatasetConditionalCommand, DatasetForbiddenCommand,
    DatasetRequiredCommand,
};
use crate::pdu::{PDataValue, PDataValueType, Pdu};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// could not send or receive a PDU
    #[snafu(display("could not exchange PDU with peer"))]
    Association { source: crate::association::Error },

    /// failed to encode a DIMSE command set
    #[snafu(display("failed to encode command set"))]
    EncodeCommand {
        source: Box<dicom_object::WriteError>,
    },

    /// failed to encode a DIMSE data set
    #[snafu(display("failed to encode data set"))]
    EncodeDataset { source: dicom_object::WriteError },

    /// failed to decode a received command set
    #[snafu(display("failed to decode command set"))]
    DecodeCommand { source: dicom_object::ReadError },

    /// failed to decode a received data set
    #[snafu(display("failed to decode data set"))]
    DecodeDataset { source: dicom_object::ReadError },

    /// a mandatory command set field was missing or had an unreadable value
    #[snafu(display("missing or malformed command field `{name}`"))]
    MalformedCommand { name: &'static str },

    /// the association was closed before a whole message could be reassembled
    #[snafu(display("peer closed the association before sending a whole message"))]
    Incomplete,

    /// received a PDU that is not valid while waiting for a DIMSE message
    #[snafu(display("received unexpected PDU while awaiting a DIMSE message"))]
    UnexpectedPdu,

    /// the transfer syntax negotiated for the presentation context is not registered
    #[snafu(display("transfer syntax `{uid}` is not known to this implementation"))]
    UnknownTransferSyntax { uid: String },

    /// a response did not carry a Message ID Being Responded To matching any
    /// request still outstanding on this association; the association is
    /// aborted, since this is a protocol error rather than a recoverable one
    #[snafu(display("uncorrelated DIMSE response: no outstanding request matches it"))]
    Uncorrelated,

    /// the request's `dimse_timeout` elapsed before a correlated response arrived
    #[snafu(display("timed out waiting for a DIMSE response"))]
    DimseTimeout,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// DIMSE status code ranges, as laid out in Part 7 Annex C.
pub mod status {
    /// The operation completed successfully.
    pub const SUCCESS: u16 = 0x0000;
    /// Matching or sub-operations are still in progress.
    pub const PENDING: u16 = 0xFF00;
    /// Matching or sub-operations are still in progress; optional keys not supported.
    pub const PENDING_WARNING: u16 = 0xFF01;
    /// The operation was cancelled at the SCU's request.
    pub const CANCEL: u16 = 0xFE00;

    /// Whether the status still expects further responses for the same request.
    pub fn is_pending(code: u16) -> bool {
        code == PENDING || code == PENDING_WARNING
    }

    /// Whether the status denotes a partially successful outcome.
    pub fn is_warning(code: u16) -> bool {
        (0xB000..=0xBFFF).contains(&code)
    }

    /// Whether the status denotes a failed outcome.
    ///
    /// This is necessarily approximate: failure codes are scattered across
    /// service-specific sub-ranges rather than one contiguous block, so this
    /// only recognizes the ranges common to the general and composite DIMSE
    /// services. Service-specific dispatch should match on the exact code
    /// when precision matters.
    pub fn is_failure(code: u16) -> bool {
        code != SUCCESS && !is_pending(code) && !is_warning(code) && code != CANCEL
    }
}

/// Allocates Message ID (0000,0110) values for an association.
///
/// Message IDs are scoped to a single association and must be unique among
/// the requests still outstanding on it; this generator simply counts
/// upwards and wraps, skipping zero, as the standard reserves no particular
/// meaning for any value but leaves zero looking uncomfortably like "unset".
#[derive(Debug, Default)]
pub struct MessageIdGenerator(u16);

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next Message ID.
    pub fn next(&mut self) -> u16 {
        self.0 = self.0.wrapping_add(1);
        if self.0 == 0 {
            self.0 = 1;
        }
        self.0
    }
}

/// A DIMSE message received from a peer: a decoded Command Set together
/// with the raw bytes of its Data Set, if the command carried one.
#[derive(Debug)]
pub struct Message {
    pub command_field: u16,
    pub command: InMemDicomObject,
    pub dataset: Option<Vec<u8>>,
    pub presentation_context_id: u8,
}

impl Message {
    fn int_field(&self, tag: Tag) -> Option<u16> {
        self.command.element(tag).ok()?.to_int::<u16>().ok()
    }

    fn str_field(&self, tag: Tag) -> Option<String> {
        self.command
            .element(tag)
            .ok()?
            .to_str()
            .ok()
            .map(|s| s.trim_end_matches('\0').to_string())
    }

    /// The command field, as one of the well-known [`CommandField`] variants,
    /// or `None` if it does not match any of them.
    pub fn command_field(&self) -> Option<CommandField> {
        CommandField::try_from(self.command_field).ok()
    }

    pub fn message_id(&self) -> Option<u16> {
        self.int_field(tags::MESSAGE_ID)
    }

    pub fn message_id_being_responded_to(&self) -> Option<u16> {
        self.int_field(tags::MESSAGE_ID_BEING_RESPONDED_TO)
    }

    pub fn status(&self) -> Option<u16> {
        self.int_field(tags::STATUS)
    }

    pub fn affected_sop_class_uid(&self) -> Option<String> {
        self.str_field(tags::AFFECTED_SOP_CLASS_UID)
    }

    pub fn affected_sop_instance_uid(&self) -> Option<String> {
        self.str_field(tags::AFFECTED_SOP_INSTANCE_UID)
    }

    pub fn requested_sop_class_uid(&self) -> Option<String> {
        self.str_field(tags::REQUESTED_SOP_CLASS_UID)
    }

    /// Decode this message's Data Set, if it has one, using the given
    /// transfer syntax -- normally the one negotiated for
    /// [`presentation_context_id`](Self::presentation_context_id).
    pub fn decode_dataset(&self, ts: &TransferSyntax) -> Result<Option<InMemDicomObject>> {
        let Some(dataset) = &self.dataset else {
            return Ok(None);
        };
        InMemDicomObject::read_dataset_with_ts(dataset.as_slice(), ts)
            .context(DecodeDatasetSnafu)
            .map(Some)
    }
}

/// Look up the transfer syntax registered under `uid`.
pub fn transfer_syntax_by_uid(uid: &str) -> Result<&'static TransferSyntax> {
    use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
    dicom_transfer_syntax_registry::TransferSyntaxRegistry
        .get(uid)
        .context(UnknownTransferSyntaxSnafu { uid })
}

/// Receive one whole DIMSE message from the peer, reassembling it out of
/// as many P-DATA-TF PDUs as it takes.
///
/// Blocks until the Command Set has fully arrived, and until the Data Set
/// has fully arrived too if the command indicates it carries one.
pub fn receive_message<S>(association: &mut impl SyncAssociation<S>) -> Result<Message>
where
    S: Read + Write + CloseSocket,
{
    let mut command_buffer = Vec::new();
    let mut command_done = false;
    let mut command: Option<InMemDicomObject> = None;
    let mut wants_dataset = false;

    let mut data_buffer = Vec::new();
    let mut data_done = false;

    let mut presentation_context_id = None;

    loop {
        if command_done && (!wants_dataset || data_done) {
            break;
        }

        match association.receive().context(AssociationSnafu)? {
            Pdu::PData { data } => {
                for value in data {
                    presentation_context_id.get_or_insert(value.presentation_context_id);
                    match value.value_type {
                        PDataValueType::Command => {
                            command_buffer.extend(value.data);
                            command_done |= value.is_last;
                        }
                        PDataValueType::Data => {
                            data_buffer.extend(value.data);
                            data_done |= value.is_last;
                        }
                    }
                }

                if command_done && command.is_none() {
                    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
                    let obj = InMemDicomObject::read_dataset_with_ts(
                        command_buffer.as_slice(),
                        &ts,
                    )
                    .context(DecodeCommandSnafu)?;

                    wants_dataset = obj
                        .element(tags::COMMAND_DATA_SET_TYPE)
                        .ok()
                        .and_then(|e| e.to_int::<u16>().ok())
                        .map(|v| v != CommandDatasetType::Absent as u16)
                        .unwrap_or(false);

                    command = Some(obj);
                }
            }
            Pdu::ReleaseRQ | Pdu::AbortRQ { .. } => return IncompleteSnafu.fail(),
            _ => return UnexpectedPduSnafu.fail(),
        }
    }

    let command = command.context(IncompleteSnafu)?;
    let command_field = command
        .element(tags::COMMAND_FIELD)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok())
        .context(MalformedCommandSnafu {
            name: "CommandField",
        })?;
    let presentation_context_id = presentation_context_id.context(IncompleteSnafu)?;

    Ok(Message {
        command_field,
        command,
        dataset: if wants_dataset { Some(data_buffer) } else { None },
        presentation_context_id,
    })
}

/// Receive a whole streamed DIMSE exchange, as C-FIND/C-GET/C-MOVE produce:
/// zero or more intermediate messages carrying a Pending status, followed
/// by one terminating message whose status is Success, Warning, Failure or
/// Cancel. The terminating message is included as the last element.
pub fn receive_streamed<S>(association: &mut impl SyncAssociation<S>) -> Result<Vec<Message>>
where
    S: Read + Write + CloseSocket,
{
    let mut messages = Vec::new();
    loop {
        let message = receive_message(association)?;
        let pending = status::is_pending(message.status().unwrap_or(status::SUCCESS));
        messages.push(message);
        if !pending {
            break;
        }
    }
    Ok(messages)
}

fn send_pdu<S>(association: &mut impl SyncAssociation<S>, pdu: Pdu) -> Result<()>
where
    S: Read + Write + CloseSocket,
{
    association.send(&pdu).context(AssociationSnafu)
}

fn send_dataset<S>(
    association: &mut impl SyncAssociation<S>,
    presentation_context_id: u8,
    dataset: &InMemDicomObject,
    transfer_syntax: &TransferSyntax,
) -> Result<()>
where
    S: Read + Write + CloseSocket,
{
    let mut writer = association.send_pdata(presentation_context_id);
    dataset
        .write_dataset_with_ts(&mut writer, transfer_syntax)
        .context(EncodeDatasetSnafu)?;
    // the writer flushes its last, possibly partial, PDU fragment on drop
    drop(writer);
    Ok(())
}

/// Send a command that never carries a Data Set, such as C-ECHO-RQ,
/// C-STORE-RSP or N-DELETE-RQ.
pub fn send_command<S, C>(
    association: &mut impl SyncAssociation<S>,
    presentation_context_id: u8,
    command: &C,
) -> Result<()>
where
    S: Read + Write + CloseSocket,
    C: DatasetForbiddenCommand,
{
    let pdu = command
        .pdu(presentation_context_id)
        .context(EncodeCommandSnafu)?;
    send_pdu(association, pdu)
}

/// Send a command that always carries a Data Set, such as C-STORE-RQ or
/// N-SET-RQ, fragmenting the Data Set across as many PDUs as needed.
pub fn send_command_with_dataset<S, C>(
    association: &mut impl SyncAssociation<S>,
    presentation_context_id: u8,
    command: &C,
    dataset: &InMemDicomObject,
    transfer_syntax: &TransferSyntax,
) -> Result<()>
where
    S: Read + Write + CloseSocket,
    C: DatasetRequiredCommand,
{
    let command_bytes = command.encode(true).context(EncodeCommandSnafu)?;
    send_pdu(
        association,
        Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: command_bytes,
            }],
        },
    )?;
    send_dataset(association, presentation_context_id, dataset, transfer_syntax)
}

/// Send a command that may or may not carry a Data Set, such as C-FIND-RSP
/// or N-GET-RSP, depending on the service's own rules for when one is
/// present (see each struct's documentation).
pub fn send_command_conditional<S, C>(
    association: &mut impl SyncAssociation<S>,
    presentation_context_id: u8,
    command: &C,
    dataset: Option<(&InMemDicomObject, &TransferSyntax)>,
) -> Result<()>
where
    S: Read + Write + CloseSocket,
    C: DatasetConditionalCommand,
{
    match dataset {
        None => {
            let pdu = command
                .pdu(presentation_context_id)
                .context(EncodeCommandSnafu)?;
            send_pdu(association, pdu)
        }
        Some((dataset, ts)) => {
            let command_bytes = command.encode(true).context(EncodeCommandSnafu)?;
            send_pdu(
                association,
                Pdu::PData {
                    data: vec![PDataValue {
                        presentation_context_id,
                        value_type: PDataValueType::Command,
                        is_last: true,
                        data: command_bytes,
                    }],
                },
            )?;
            send_dataset(association, presentation_context_id, dataset, ts)
        }
    }
}

/// An outstanding SCU request: which service it invoked, and the deadline
/// (if any) by which a correlated response must arrive.
#[derive(Debug, Clone, Copy)]
struct Outstanding {
    service: CommandField,
    deadline: Option<Instant>,
}

/// Drives the SCU half of the DIMSE Provider for one association: allocates
/// Message IDs, keeps a correlation table of outstanding requests keyed by
/// (Context ID, Message ID), and matches each arriving response against it
/// by its Message ID Being Responded To. A response that does not correlate
/// to anything outstanding -- or a request whose `dimse_timeout` has
/// elapsed -- is a protocol error: the association is aborted rather than
/// left in an ambiguous state.
pub struct DimseProvider<'a, A, S>
where
    A: SyncAssociation<S>,
    S: Read + Write + CloseSocket,
{
    association: &'a mut A,
    message_ids: MessageIdGenerator,
    outstanding: HashMap<(u8, u16), Outstanding>,
    dimse_timeout: Option<Duration>,
    _socket: std::marker::PhantomData<S>,
}

impl<'a, A, S> DimseProvider<'a, A, S>
where
    A: SyncAssociation<S>,
    S: Read + Write + CloseSocket,
{
    /// Build a provider over an established association. `dimse_timeout`
    /// bounds how long a single request may wait for its (first) response;
    /// `None` disables the bound.
    pub fn new(association: &'a mut A, dimse_timeout: Option<Duration>) -> Self {
        Self {
            association,
            message_ids: MessageIdGenerator::new(),
            outstanding: HashMap::new(),
            dimse_timeout,
            _socket: std::marker::PhantomData,
        }
    }

    /// Allocate the next Message ID, without yet arming a correlation entry.
    pub fn next_message_id(&mut self) -> u16 {
        self.message_ids.next()
    }

    /// The service an outstanding request under `(presentation_context_id,
    /// message_id)` was sent for, if any is still awaiting a response.
    pub fn outstanding_service(&self, presentation_context_id: u8, message_id: u16) -> Option<CommandField> {
        self.outstanding
            .get(&(presentation_context_id, message_id))
            .map(|o| o.service)
    }

    fn arm(&mut self, presentation_context_id: u8, message_id: u16, service: CommandField) {
        let deadline = self.dimse_timeout.map(|d| Instant::now() + d);
        self.outstanding.insert(
            (presentation_context_id, message_id),
            Outstanding { service, deadline },
        );
    }

    /// Receive the next message and correlate it against the outstanding
    /// table. Pending responses keep their entry armed, since C-FIND/
    /// C-GET/C-MOVE may still have more to send; any other status retires
    /// the entry.
    fn receive_correlated(&mut self) -> Result<Message> {
        let message = receive_message(self.association)?;

        let key = message
            .message_id_being_responded_to()
            .map(|mid| (message.presentation_context_id, mid));

        let Some(key) = key else {
            let _ = self.association.abort();
            return UncorrelatedSnafu.fail();
        };

        let Some(outstanding) = self.outstanding.get(&key) else {
            let _ = self.association.abort();
            return UncorrelatedSnafu.fail();
        };

        if let Some(deadline) = outstanding.deadline {
            if Instant::now() > deadline {
                self.outstanding.remove(&key);
                let _ = self.association.abort();
                return DimseTimeoutSnafu.fail();
            }
        }

        if !status::is_pending(message.status().unwrap_or(status::SUCCESS)) {
            self.outstanding.remove(&key);
        }

        Ok(message)
    }

    /// Receive every message of a streamed exchange (C-FIND/C-GET/C-MOVE),
    /// correlating each one, stopping at the first non-pending status.
    fn receive_correlated_stream(&mut self) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        loop {
            let message = self.receive_correlated()?;
            let pending = status::is_pending(message.status().unwrap_or(status::SUCCESS));
            messages.push(message);
            if !pending {
                break;
            }
        }
        Ok(messages)
    }

    /// Send a C-ECHO-RQ verifying association-level connectivity, and
    /// return its single response.
    pub fn send_c_echo(
        &mut self,
        presentation_context_id: u8,
        affected_sop_class_uid: &str,
    ) -> Result<Message> {
        let message_id = self.message_ids.next();
        let rq = CEchoRq::builder()
            .message_id(message_id)
            .affected_sop_class_uid(affected_sop_class_uid)
            .build();
        self.arm(presentation_context_id, message_id, CommandField::C_ECHO_RQ);
        send_command(self.association, presentation_context_id, &rq)?;
        self.receive_correlated()
    }

    /// Send a C-STORE-RQ together with its Data Set, and return the single
    /// C-STORE-RSP that answers it. `request.message_id` is used as the
    /// correlation key, so callers should allocate it via
    /// [`next_message_id`](Self::next_message_id).
    pub fn send_c_store(
        &mut self,
        presentation_context_id: u8,
        request: &CStoreRq<'_>,
        dataset: &InMemDicomObject,
        transfer_syntax: &TransferSyntax,
    ) -> Result<Message> {
        self.arm(presentation_context_id, request.message_id, CommandField::C_STORE_RQ);
        send_command_with_dataset(
            self.association,
            presentation_context_id,
            request,
            dataset,
            transfer_syntax,
        )?;
        self.receive_correlated()
    }

    /// Send a C-FIND-RQ together with its Identifier, and return every
    /// response: zero or more Pending matches followed by the terminating
    /// Success/Cancel/Failure response.
    pub fn send_c_find(
        &mut self,
        presentation_context_id: u8,
        request: &CFindRq<'_>,
        identifier: &InMemDicomObject,
        transfer_syntax: &TransferSyntax,
    ) -> Result<Vec<Message>> {
        self.arm(presentation_context_id, request.message_id, CommandField::C_FIND_RQ);
        send_command_with_dataset(
            self.association,
            presentation_context_id,
            request,
            identifier,
            transfer_syntax,
        )?;
        self.receive_correlated_stream()
    }

    /// Send a C-GET-RQ together with its Identifier, and return every
    /// response, including the interleaved C-STORE sub-operations the SCP
    /// performs back over this same association.
    pub fn send_c_get(
        &mut self,
        presentation_context_id: u8,
        request: &CGetRq<'_>,
        identifier: &InMemDicomObject,
        transfer_syntax: &TransferSyntax,
    ) -> Result<Vec<Message>> {
        self.arm(presentation_context_id, request.message_id, CommandField::C_GET_RQ);
        send_command_with_dataset(
            self.association,
            presentation_context_id,
            request,
            identifier,
            transfer_syntax,
        )?;
        self.receive_correlated_stream()
    }

    /// Send a C-MOVE-RQ together with its Identifier, and return every
    /// response.
    pub fn send_c_move(
        &mut self,
        presentation_context_id: u8,
        request: &CMoveRq<'_>,
        identifier: &InMemDicomObject,
        transfer_syntax: &TransferSyntax,
    ) -> Result<Vec<Message>> {
        self.arm(presentation_context_id, request.message_id, CommandField::C_MOVE_RQ);
        send_command_with_dataset(
            self.association,
            presentation_context_id,
            request,
            identifier,
            transfer_syntax,
        )?;
        self.receive_correlated_stream()
    }

    /// Send a C-CANCEL-RQ for a previously issued C-FIND/C-GET/C-MOVE
    /// request, identified by the Message ID it was sent under. The
    /// standard defines no response to a cancel request, so this does not
    /// wait for one; the cancelled operation's own outstanding entry is
    /// left in the table; its eventual Cancel-status response retires it as
    /// usual.
    pub fn send_c_cancel<C>(
        &mut self,
        presentation_context_id: u8,
        cancel: &C,
    ) -> Result<()>
    where
        C: DatasetForbiddenCommand,
    {
        send_command(self.association, presentation_context_id, cancel)
    }
}

/// Tracks C-CANCEL-RQ requests received for in-progress C-FIND/C-GET/
/// C-MOVE operations, on the SCP side. The standard allows an SCP to act on
/// a cancel "at its next convenient opportunity" rather than immediately,
/// so this is a flag an in-progress operation's response loop polls rather
/// than an interrupt.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    cancelled: HashSet<(u8, u16)>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a C-CANCEL-RQ was received for the operation under
    /// `(presentation_context_id, message_id)`.
    pub fn is_cancelled(&self, presentation_context_id: u8, message_id: u16) -> bool {
        self.cancelled
            .contains(&(presentation_context_id, message_id))
    }

    /// Clear the cancel flag once the operation's final response has been sent.
    pub fn clear(&mut self, presentation_context_id: u8, message_id: u16) {
        self.cancelled.remove(&(presentation_context_id, message_id));
    }
}

/// Inspect a received message: if it is a C-CANCEL-RQ, record it in
/// `registry` against the Message ID it cancels (its Message ID Being
/// Responded To) and report that it was consumed. Returns `false` for any
/// other command, leaving `registry` untouched.
pub fn handle_c_cancel(message: &Message, registry: &mut CancelRegistry) -> bool {
    if message.command_field() != Some(CommandField::C_CANCEL_RQ) {
        return false;
    }
    if let Some(message_id) = message.message_id_being_responded_to() {
        registry
            .cancelled
            .insert((message.presentation_context_id, message_id));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{dicom_value, DataElement, VR};

    #[test]
    fn message_id_generator_wraps_and_skips_zero() {
        let mut gen = MessageIdGenerator::new();
        assert_eq!(gen.next(), 1);
        assert_eq!(gen.next(), 2);

        gen.0 = u16::MAX;
        assert_eq!(gen.next(), 1);
    }

    #[test]
    fn status_classification() {
        assert!(status::is_pending(status::PENDING));
        assert!(status::is_pending(status::PENDING_WARNING));
        assert!(!status::is_pending(status::SUCCESS));

        assert!(status::is_failure(0xA700));
        assert!(!status::is_failure(status::SUCCESS));
        assert!(!status::is_failure(status::CANCEL));
        assert!(!status::is_failure(status::PENDING));

        assert!(status::is_warning(0xB000));
        assert!(!status::is_warning(status::SUCCESS));
    }

    fn message_with(command_field: CommandField, message_id_being_responded_to: Option<u16>) -> Message {
        let mut command = InMemDicomObject::new_empty();
        command.put(DataElement::new(
            tags::COMMAND_FIELD,
            VR::US,
            dicom_value!(command_field as u16),
        ));
        if let Some(mid) = message_id_being_responded_to {
            command.put(DataElement::new(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                VR::US,
                dicom_value!(mid),
            ));
        }
        Message {
            command_field: command_field as u16,
            command,
            dataset: None,
            presentation_context_id: 1,
        }
    }

    #[test]
    fn cancel_registry_tracks_and_clears() {
        let mut registry = CancelRegistry::new();
        assert!(!registry.is_cancelled(1, 7));

        registry.cancelled.insert((1, 7));
        assert!(registry.is_cancelled(1, 7));
        assert!(!registry.is_cancelled(1, 8));
        assert!(!registry.is_cancelled(2, 7));

        registry.clear(1, 7);
        assert!(!registry.is_cancelled(1, 7));
    }

    #[test]
    fn handle_c_cancel_records_cancel_requests() {
        let mut registry = CancelRegistry::new();
        let message = message_with(CommandField::C_CANCEL_RQ, Some(42));

        assert!(handle_c_cancel(&message, &mut registry));
        assert!(registry.is_cancelled(1, 42));
    }

    #[test]
    fn handle_c_cancel_ignores_other_commands() {
        let mut registry = CancelRegistry::new();
        let message = message_with(CommandField::C_FIND_RQ, Some(42));

        assert!(!handle_c_cancel(&message, &mut registry));
        assert!(!registry.is_cancelled(1, 42));
    }

    #[test]
    fn handle_c_cancel_without_a_target_message_id_is_still_consumed() {
        let mut registry = CancelRegistry::new();
        let message = message_with(CommandField::C_CANCEL_RQ, None);

        assert!(handle_c_cancel(&message, &mut registry));
        assert!(registry.cancelled.is_empty());
    }
}
