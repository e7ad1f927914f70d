//! DICOM association module
//!
//! This module contains utilities for establishing associations
//! between DICOM nodes via TCP/IP, either as the requesting party
//! (see [`client`]) or as the accepting party (see [`server`]).

use std::time::Duration;

use bytes::BytesMut;
use snafu::{ensure, ResultExt, Snafu};

use crate::pdu::{
    AbortRQSource, AssociationRJ, Pdu, PresentationContextNegotiated, UserVariableItem,
    PDU_HEADER_SIZE,
};

pub mod client;
pub mod pdata;
pub mod server;
pub(crate) mod uid;

pub(crate) use pdata::PDataWriter;
#[cfg(feature = "async")]
pub(crate) use pdata::AsyncPDataWriter;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// the association was aborted by the other node
    Aborted,

    /// missing abstract syntax to begin negotiation
    MissingAbstractSyntax,

    #[snafu(display("association rejected by the other node: {:?}", association_rj))]
    #[non_exhaustive]
    Rejected {
        /// the rejection PDU received from, or sent to, the other node
        association_rj: AssociationRJ,
    },

    /// failed to encode PDU message
    SendPdu { source: crate::pdu::WriteError },

    #[snafu(display(
        "encoded PDU of {} bytes exceeds peer's maximum accepted length of {}",
        length,
        max_pdu_length
    ))]
    PduTooLarge { length: u32, max_pdu_length: u32 },

    #[snafu(display("unexpected PDU `{:?}`", pdu))]
    #[non_exhaustive]
    UnexpectedPdu {
        /// the PDU obtained from the other node
        pdu: Pdu,
    },

    #[snafu(display("unknown PDU `{:?}`", pdu))]
    #[non_exhaustive]
    UnknownPdu {
        /// the PDU obtained from the other node, of variant Unknown
        pdu: Pdu,
    },

    /// failed to send PDU bytes through the wire
    WireSend { source: std::io::Error },

    /// failed to receive PDU bytes through the wire
    WireReceive { source: std::io::Error },

    /// the connection was closed before a full PDU could be read
    ConnectionClosed,

    /// failed to decode a received PDU
    ReceivePdu {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },

    /// failed to set the read timeout of the socket
    SetReadTimeout { source: std::io::Error },

    /// failed to set the write timeout of the socket
    SetWriteTimeout { source: std::io::Error },

    /// could not connect to the remote application entity
    Connect { source: std::io::Error },

    /// no TLS configuration was provided for a TLS association
    #[cfg(any(feature = "sync-tls", feature = "async-tls"))]
    TlsConfigMissing,

    /// failed to establish the TLS connection
    #[cfg(feature = "sync-tls")]
    TlsConnection { source: rustls::Error },

    /// operation did not complete before the configured timeout elapsed
    #[cfg(feature = "async")]
    Timeout { source: tokio::time::error::Elapsed },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Options for the underlying TCP socket used by an association.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketOptions {
    /// Timeout for individual read operations on the socket.
    pub read_timeout: Option<Duration>,
    /// Timeout for individual write operations on the socket.
    pub write_timeout: Option<Duration>,
    /// Timeout for establishing the initial TCP connection.
    pub connection_timeout: Option<Duration>,
}

/// The outcome of a successful ACSE negotiation,
/// as seen from the accepting side.
pub(crate) struct NegotiatedOptions {
    /// the user variables proposed by the requesting node
    pub user_variables: Vec<UserVariableItem>,
    /// the presentation contexts, negotiated against what this node supports
    pub presentation_contexts: Vec<PresentationContextNegotiated>,
    /// the maximum PDU length accepted by the requesting node
    pub peer_max_pdu_length: u32,
    /// the calling AE title of the requesting node
    pub peer_ae_title: String,
}

/// A socket that can be gracefully shut down once an association is over.
pub trait CloseSocket {
    /// Shut down both halves of the connection.
    fn close(&mut self) -> std::io::Result<()>;
}

impl CloseSocket for std::net::TcpStream {
    fn close(&mut self) -> std::io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
}

#[cfg(feature = "sync-tls")]
impl<C> CloseSocket for rustls::StreamOwned<C, std::net::TcpStream> {
    fn close(&mut self) -> std::io::Result<()> {
        self.sock.shutdown(std::net::Shutdown::Both)
    }
}

/// Map an arriving PDU onto the state machine event it represents.
pub(crate) fn event_for_received_pdu(pdu: &Pdu) -> crate::sm::Event {
    use crate::sm::Event;
    match pdu {
        Pdu::PData { .. } => Event::RecvPData,
        Pdu::ReleaseRQ => Event::RecvReleaseRq,
        Pdu::ReleaseRP => Event::RecvReleaseRp,
        Pdu::AbortRQ { .. } => Event::RecvAbort,
        Pdu::AssociationRQ(_) => Event::RecvAssociateRq,
        Pdu::AssociationAC(_) => Event::RecvAssociateAc,
        Pdu::AssociationRJ(_) => Event::RecvAssociateRj,
        Pdu::Unknown { .. } => Event::InvalidOrUnrecognizedPdu,
    }
}

/// Common accessors of an established DICOM upper layer association,
/// shared by both the synchronous and the asynchronous flavors.
pub trait Association {
    /// Obtain a view of the negotiated presentation contexts.
    fn presentation_contexts(&self) -> &[PresentationContextNegotiated];

    /// Retrieve the maximum PDU length admitted by this application entity.
    fn acceptor_max_pdu_length(&self) -> u32;

    /// Retrieve the maximum PDU length that the other node is expecting to receive.
    fn requestor_max_pdu_length(&self) -> u32;

    /// Obtain the remote DICOM node's application entity title.
    fn peer_ae_title(&self) -> &str;

    /// Obtain the user variables provided by the other node during negotiation.
    fn user_variables(&self) -> &[UserVariableItem];
}

/// Sealed traits backing [`SyncAssociation`] and [`AsyncAssociation`].
///
/// These are kept private so that the raw send/receive/close operations
/// can only be reached through the public traits' default methods,
/// which guarantee that buffers and timeouts are handled consistently.
pub(crate) mod private {
    use super::{Pdu, Result};

    pub trait SyncAssociationSealed<S> {
        fn send(&mut self, pdu: &Pdu) -> Result<()>;
        fn receive(&mut self) -> Result<Pdu>;
        fn close(&mut self) -> std::io::Result<()>;

        /// The association's current place in the upper layer state
        /// machine (see [`crate::sm`]), tracked from [`State::Established`](crate::sm::State::Established)
        /// onwards now that negotiation has already taken place.
        fn sm_state(&self) -> &std::cell::Cell<crate::sm::State>;
    }

    #[cfg(feature = "async")]
    pub trait AsyncAssociationSealed<S> {
        fn send(&mut self, pdu: &Pdu) -> impl std::future::Future<Output = Result<()>> + Send;
        fn receive(&mut self) -> impl std::future::Future<Output = Result<Pdu>> + Send;
        fn close(&mut self) -> impl std::future::Future<Output = std::io::Result<()>> + Send;
    }
}

/// An established, synchronous DICOM upper layer association.
///
/// Built on top of [`Association`] and the sealed send/receive/close
/// primitives, this trait provides the operations of an open association:
/// [`send`](Self::send), [`receive`](Self::receive),
/// [`send_pdata`](Self::send_pdata), [`release`](Self::release)
/// and [`abort`](Self::abort).
pub trait SyncAssociation<S>: Association + private::SyncAssociationSealed<S>
where
    S: std::io::Read + std::io::Write + CloseSocket,
{
    /// Obtain direct access to the underlying socket.
    fn inner_stream(&mut self) -> &mut S;

    /// Obtain the underlying socket together with its read buffer.
    fn get_mut(&mut self) -> (&mut S, &mut BytesMut);

    /// Send a PDU message to the other node.
    fn send(&mut self, pdu: &Pdu) -> Result<()> {
        <Self as private::SyncAssociationSealed<S>>::send(self, pdu)
    }

    /// Advance the upper layer state machine by one event, updating the
    /// association's tracked state and returning the actions the caller
    /// must now carry out.
    fn sm_advance(&mut self, event: crate::sm::Event) -> crate::sm::Actions {
        let cell = <Self as private::SyncAssociationSealed<S>>::sm_state(self);
        let current = cell.get();
        let (next, actions) = crate::sm::transition(current, event);
        cell.set(next);
        actions
    }

    /// Read a PDU message from the other node.
    ///
    /// PDUs arriving while the state machine is in Sta13 (awaiting transport
    /// close, e.g. after an abort has already been sent) are silently
    /// discarded rather than handed to the caller, per AA-6/AA-7.
    fn receive(&mut self) -> Result<Pdu> {
        loop {
            let pdu = <Self as private::SyncAssociationSealed<S>>::receive(self)?;
            let event = event_for_received_pdu(&pdu);
            let actions = self.sm_advance(event);
            if actions.iter().any(|a| matches!(a, crate::sm::Action::Ignore)) {
                continue;
            }
            return Ok(pdu);
        }
    }

    /// Shut down the underlying connection immediately, without
    /// attempting a graceful release.
    fn close(&mut self) -> std::io::Result<()> {
        <Self as private::SyncAssociationSealed<S>>::close(self)
    }

    /// Send a P-Data value in fragments,
    /// through a dedicated writer that automatically
    /// splits the data into separate PDUs if necessary.
    fn send_pdata(&mut self, presentation_context_id: u8) -> PDataWriter<&mut S> {
        let max_pdu_length = self.requestor_max_pdu_length();
        PDataWriter::new(self.inner_stream(), presentation_context_id, max_pdu_length)
    }

    /// Gracefully release the association.
    ///
    /// Drives the release half of the state machine (Sta6-Sta12): a release
    /// request crossing the peer's own A-RELEASE-RQ on the wire is resolved
    /// as a release collision rather than treated as a protocol error, and
    /// stray P-Data arriving while releasing is dropped (there is no
    /// local-user callback yet to forward it to).
    fn release(&mut self) -> Result<()> {
        let _ = self.sm_advance(crate::sm::Event::ReleaseRequest);
        SyncAssociation::send(self, &Pdu::ReleaseRQ)?;
        loop {
            let pdu = SyncAssociation::receive(self)?;
            let event = event_for_received_pdu(&pdu);
            let actions = self.sm_advance(event);

            if actions
                .iter()
                .any(|a| matches!(a, crate::sm::Action::IndicateReleaseConfirmAndClose))
                || actions.iter().any(|a| {
                    matches!(a, crate::sm::Action::IndicateReleaseConfirmCollision)
                })
            {
                let _ = SyncAssociation::close(self);
                return Ok(());
            }

            if actions
                .iter()
                .any(|a| matches!(a, crate::sm::Action::IndicateReleaseCollision))
            {
                let collision_actions = self.sm_advance(crate::sm::Event::ReleaseResponse);
                debug_assert!(collision_actions
                    .iter()
                    .any(|a| matches!(a, crate::sm::Action::SendReleaseRpCollision)));
                SyncAssociation::send(self, &Pdu::ReleaseRP)?;
                continue;
            }

            if actions
                .iter()
                .any(|a| matches!(a, crate::sm::Action::IndicatePDataWhileReleasing))
            {
                continue;
            }

            return match pdu {
                pdu @ Pdu::Unknown { .. } => UnknownPduSnafu { pdu }.fail(),
                pdu => UnexpectedPduSnafu { pdu }.fail(),
            };
        }
    }

    /// Forcefully abort the association, notifying the other node.
    fn abort(&mut self) -> Result<()> {
        let _ = self.sm_advance(crate::sm::Event::AbortRequest);
        SyncAssociation::send(
            self,
            &Pdu::AbortRQ {
                source: AbortRQSource::ServiceUser,
            },
        )?;
        let _ = SyncAssociation::close(self);
        Ok(())
    }
}

/// An established, asynchronous DICOM upper layer association.
///
/// Mirrors [`SyncAssociation`] for the `async` feature.
#[cfg(feature = "async")]
pub trait AsyncAssociation<S>: Association + private::AsyncAssociationSealed<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    /// Obtain direct access to the underlying socket.
    fn inner_stream(&mut self) -> &mut S;

    /// Obtain the underlying socket together with its read buffer.
    fn get_mut(&mut self) -> (&mut S, &mut BytesMut);

    /// Send a PDU message to the other node.
    fn send(&mut self, pdu: &Pdu) -> impl std::future::Future<Output = Result<()>> + Send {
        <Self as private::AsyncAssociationSealed<S>>::send(self, pdu)
    }

    /// Read a PDU message from the other node.
    fn receive(&mut self) -> impl std::future::Future<Output = Result<Pdu>> + Send {
        <Self as private::AsyncAssociationSealed<S>>::receive(self)
    }

    /// Shut down the underlying connection immediately, without
    /// attempting a graceful release.
    fn close(&mut self) -> impl std::future::Future<Output = std::io::Result<()>> + Send {
        <Self as private::AsyncAssociationSealed<S>>::close(self)
    }

    /// Send a P-Data value in fragments,
    /// through a dedicated writer that automatically
    /// splits the data into separate PDUs if necessary.
    ///
    /// Callers must await [`AsyncPDataWriter::finish`]
    /// once all fragments have been written.
    fn send_pdata(&mut self, presentation_context_id: u8) -> AsyncPDataWriter<&mut S> {
        let max_pdu_length = self.requestor_max_pdu_length();
        AsyncPDataWriter::new(self.inner_stream(), presentation_context_id, max_pdu_length)
    }

    /// Gracefully release the association.
    fn release(&mut self) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            AsyncAssociation::send(self, &Pdu::ReleaseRQ).await?;
            match AsyncAssociation::receive(self).await? {
                Pdu::ReleaseRP => {
                    let _ = AsyncAssociation::close(self).await;
                    Ok(())
                }
                pdu @ Pdu::AbortRQ { .. }
                | pdu @ Pdu::AssociationAC(_)
                | pdu @ Pdu::AssociationRJ(_)
                | pdu @ Pdu::AssociationRQ(_)
                | pdu @ Pdu::PData { .. }
                | pdu @ Pdu::ReleaseRQ => UnexpectedPduSnafu { pdu }.fail(),
                pdu @ Pdu::Unknown { .. } => UnknownPduSnafu { pdu }.fail(),
            }
        }
    }

    /// Forcefully abort the association, notifying the other node.
    fn abort(&mut self) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            AsyncAssociation::send(
                self,
                &Pdu::AbortRQ {
                    source: AbortRQSource::ServiceUser,
                },
            )
            .await?;
            let _ = AsyncAssociation::close(self).await;
            Ok(())
        }
    }
}

/// Encode a PDU into the given buffer,
/// failing if the result would exceed the peer's maximum accepted PDU length.
pub(crate) fn encode_pdu(buffer: &mut Vec<u8>, pdu: &Pdu, max_pdu_length: u32) -> Result<()> {
    crate::pdu::write_pdu(buffer, pdu).context(SendPduSnafu)?;
    ensure!(
        buffer.len() as u32 <= max_pdu_length,
        PduTooLargeSnafu {
            length: buffer.len() as u32,
            max_pdu_length,
        }
    );
    Ok(())
}

/// Read one PDU from a blocking socket,
/// using `read_buffer` to retain bytes read ahead of the current PDU
/// (for instance, when the peer pipelines several P-Data PDUs in one segment).
pub(crate) fn read_pdu_from_wire<R>(
    socket: &mut R,
    read_buffer: &mut BytesMut,
    max_pdu_length: u32,
    strict: bool,
) -> Result<Pdu>
where
    R: std::io::Read,
{
    let mut chunk = [0_u8; 2048];

    while read_buffer.len() < PDU_HEADER_SIZE as usize {
        let n = socket.read(&mut chunk).context(WireReceiveSnafu)?;
        ensure!(n > 0, ConnectionClosedSnafu);
        read_buffer.extend_from_slice(&chunk[..n]);
    }

    let pdu_length = u32::from_be_bytes([
        read_buffer[2],
        read_buffer[3],
        read_buffer[4],
        read_buffer[5],
    ]);
    let total_length = PDU_HEADER_SIZE as usize + pdu_length as usize;

    while read_buffer.len() < total_length {
        let n = socket.read(&mut chunk).context(WireReceiveSnafu)?;
        ensure!(n > 0, ConnectionClosedSnafu);
        read_buffer.extend_from_slice(&chunk[..n]);
    }

    let pdu_bytes = read_buffer.split_to(total_length);
    let mut cursor = std::io::Cursor::new(pdu_bytes);
    crate::pdu::read_pdu(&mut cursor, max_pdu_length, strict).context(ReceivePduSnafu)
}

/// Asynchronous counterpart of [`read_pdu_from_wire`].
#[cfg(feature = "async")]
pub(crate) async fn read_pdu_from_wire_async<R>(
    socket: &mut R,
    read_buffer: &mut BytesMut,
    max_pdu_length: u32,
    strict: bool,
) -> Result<Pdu>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    while read_buffer.len() < PDU_HEADER_SIZE as usize {
        let n = socket.read_buf(read_buffer).await.context(WireReceiveSnafu)?;
        ensure!(n > 0, ConnectionClosedSnafu);
    }

    let pdu_length = u32::from_be_bytes([
        read_buffer[2],
        read_buffer[3],
        read_buffer[4],
        read_buffer[5],
    ]);
    let total_length = PDU_HEADER_SIZE as usize + pdu_length as usize;

    while read_buffer.len() < total_length {
        let n = socket.read_buf(read_buffer).await.context(WireReceiveSnafu)?;
        ensure!(n > 0, ConnectionClosedSnafu);
    }

    let pdu_bytes = read_buffer.split_to(total_length);
    let mut cursor = std::io::Cursor::new(pdu_bytes);
    crate::pdu::read_pdu(&mut cursor, max_pdu_length, strict).context(ReceivePduSnafu)
}

/// Run a future to completion, failing with [`Error::Timeout`]
/// if `duration` elapses first. A `None` duration disables the timeout.
#[cfg(feature = "async")]
pub(crate) async fn timeout<F, T>(duration: Option<Duration>, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match duration {
        Some(d) => tokio::time::timeout(d, fut).await.context(TimeoutSnafu)?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_pipelined_pdus_from_a_shared_buffer() {
        let mut bytes = Vec::new();
        crate::pdu::write_pdu(&mut bytes, &Pdu::ReleaseRQ).unwrap();
        crate::pdu::write_pdu(&mut bytes, &Pdu::ReleaseRP).unwrap();

        let mut socket = Cursor::new(bytes);
        let mut read_buffer = BytesMut::new();

        let first = read_pdu_from_wire(&mut socket, &mut read_buffer, crate::pdu::MINIMUM_PDU_SIZE, true)
            .unwrap();
        assert!(matches!(first, Pdu::ReleaseRQ));

        let second = read_pdu_from_wire(&mut socket, &mut read_buffer, crate::pdu::MINIMUM_PDU_SIZE, true)
            .unwrap();
        assert!(matches!(second, Pdu::ReleaseRP));
    }

    #[test]
    fn encode_pdu_rejects_oversized_output() {
        let mut buffer = Vec::new();
        let err = encode_pdu(&mut buffer, &Pdu::ReleaseRQ, 4).unwrap_err();
        assert!(matches!(err, Error::PduTooLarge { .. }));
    }
}
