//! Association initiation module
//!
//! The module provides an abstraction for a DICOM association
//! in which this application entity initiates the connection,
//! taking the role of a service class user (SCU).
//! See [`ClientAssociationOptions`] for details and examples
//! on how to establish an association.
use bytes::BytesMut;
use std::borrow::Cow;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use snafu::{ensure, OptionExt, ResultExt};

use crate::association::private::SyncAssociationSealed;
use crate::association::{
    encode_pdu, read_pdu_from_wire, Association, CloseSocket, ConnectSnafu, RejectedSnafu,
    SendPduSnafu, SetReadTimeoutSnafu, SetWriteTimeoutSnafu, SocketOptions, SyncAssociation,
    UnexpectedPduSnafu, UnknownPduSnafu, WireSendSnafu,
};
use crate::pdu::{
    reader::DEFAULT_MAX_PDU, AssociationAC, AssociationRJ, AssociationRQ, AsynchronousOperationsWindow,
    Pdu, PresentationContextNegotiated, PresentationContextProposed, PresentationContextResultReason,
    RoleSelection, UserIdentity, UserVariableItem, PDU_HEADER_SIZE,
};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

use super::uid::trim_uid;
use super::{Error, Result};

#[cfg(feature = "sync-tls")]
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, std::net::TcpStream>;
#[cfg(feature = "async-tls")]
pub type AsyncTlsStream = tokio_rustls::client::TlsStream<tokio::net::TcpStream>;

/// A DICOM association builder for a requesting application entity,
/// often taking the role of a service class user (SCU).
///
/// This is the standard way of negotiating and establishing
/// an association with an accepting node.
/// The outcome is a [`ClientAssociation`].
///
/// The SCU will propose by default the transfer syntaxes
/// _Implicit VR Little Endian_ and _Explicit VR Little Endian_,
/// unless one or more transfer syntaxes are explicitly indicated
/// through calls to [`with_transfer_syntax`][Self::with_transfer_syntax].
///
/// # Example
///
/// ```no_run
/// # use dicom_ul::association::client::ClientAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let association = ClientAssociationOptions::new()
///    .with_abstract_syntax("1.2.840.10008.1.1")
///    .with_transfer_syntax("1.2.840.10008.1.2.1")
///    .establish("129.168.0.5:104")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions<'a> {
    /// the calling AE title
    calling_ae_title: Cow<'a, str>,
    /// the called AE title
    called_ae_title: Cow<'a, str>,
    /// the requested application context name
    application_context_name: Cow<'a, str>,
    /// the list of requested abstract syntaxes
    abstract_syntax_uids: Vec<Cow<'a, str>>,
    /// the list of requested transfer syntaxes
    transfer_syntax_uids: Vec<Cow<'a, str>>,
    /// role selection items, one per abstract syntax requiring non-default roles
    role_selections: Vec<RoleSelection>,
    /// the user identity to present during negotiation, if any
    user_identity: Option<UserIdentity>,
    /// the asynchronous operations window to request, if any
    async_ops_window: Option<AsynchronousOperationsWindow>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length this node is willing to receive
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// Options for the underlying TCP socket
    socket_options: SocketOptions,
    /// TLS configuration for the underlying TCP socket
    #[cfg(feature = "sync-tls")]
    tls_config: Option<std::sync::Arc<rustls::ClientConfig>>,
}

impl Default for ClientAssociationOptions<'_> {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: "ANY-SCP".into(),
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            role_selections: Vec::new(),
            user_identity: None,
            async_ops_window: None,
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            socket_options: SocketOptions::default(),
            #[cfg(feature = "sync-tls")]
            tls_config: None,
        }
    }
}

impl<'a> ClientAssociationOptions<'a> {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title for the association,
    /// which refers to this DICOM node.
    ///
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title for the association,
    /// which refers to the target DICOM node.
    ///
    /// The default is `ANY-SCP`.
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.called_ae_title = called_ae_title.into();
        self
    }

    /// Include this abstract syntax
    /// in the list of proposed presentation contexts.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.abstract_syntax_uids
            .push(trim_uid(abstract_syntax_uid.into()));
        self
    }

    /// Include this transfer syntax in each proposed presentation context.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.transfer_syntax_uids
            .push(trim_uid(transfer_syntax_uid.into()));
        self
    }

    /// Request a non-default SCU/SCP role for the given abstract syntax.
    pub fn with_role_selection(mut self, role: RoleSelection) -> Self {
        self.role_selections.push(role);
        self
    }

    /// Present this user identity to the acceptor during negotiation.
    pub fn user_identity(mut self, identity: UserIdentity) -> Self {
        self.user_identity = Some(identity);
        self
    }

    /// Request an asynchronous operations window.
    pub fn async_ops_window(mut self, max_operations_invoked: u16, max_operations_performed: u16) -> Self {
        self.async_ops_window = Some(AsynchronousOperationsWindow {
            max_operations_invoked,
            max_operations_performed,
        });
        self
    }

    /// Override the maximum PDU length this node is willing to receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override strict mode:
    /// whether receiving PDUs must not
    /// surpass the negotiated maximum PDU length.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the read timeout for the underlying TCP socket
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout for the underlying TCP socket
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.write_timeout = Some(timeout);
        self
    }

    /// Set the connection timeout for the underlying TCP socket
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.connection_timeout = Some(timeout);
        self
    }

    /// Set the TLS configuration for the underlying TCP socket
    #[cfg(feature = "sync-tls")]
    pub fn tls_config(mut self, config: impl Into<std::sync::Arc<rustls::ClientConfig>>) -> Self {
        self.tls_config = Some(config.into());
        self
    }

    fn build_request(&self) -> Result<(Pdu, Vec<PresentationContextProposed>)> {
        ensure!(
            !self.abstract_syntax_uids.is_empty(),
            super::MissingAbstractSyntaxSnafu
        );

        let mut transfer_syntax_uids = self.transfer_syntax_uids.clone();
        if transfer_syntax_uids.is_empty() {
            transfer_syntax_uids.push("1.2.840.10008.1.2.1".into());
            transfer_syntax_uids.push("1.2.840.10008.1.2".into());
        }

        let presentation_contexts: Vec<_> = self
            .abstract_syntax_uids
            .iter()
            .enumerate()
            .map(|(i, abstract_syntax)| PresentationContextProposed {
                id: (i * 2 + 1) as u8,
                abstract_syntax: abstract_syntax.to_string(),
                transfer_syntaxes: transfer_syntax_uids.iter().map(|uid| uid.to_string()).collect(),
            })
            .collect();

        let mut user_variables = vec![
            UserVariableItem::MaxLength(self.max_pdu_length),
            UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
            UserVariableItem::ImplementationVersionName(IMPLEMENTATION_VERSION_NAME.to_string()),
        ];
        if let Some(window) = self.async_ops_window.clone() {
            user_variables.push(UserVariableItem::AsynchronousOperationsWindow(window));
        }
        for role in &self.role_selections {
            user_variables.push(UserVariableItem::RoleSelection(role.clone()));
        }
        if let Some(identity) = self.user_identity.clone() {
            user_variables.push(UserVariableItem::UserIdentityItem(identity));
        }

        let pdu = Pdu::AssociationRQ(AssociationRQ {
            protocol_version: self.protocol_version,
            calling_ae_title: self.calling_ae_title.to_string(),
            called_ae_title: self.called_ae_title.to_string(),
            application_context_name: self.application_context_name.to_string(),
            presentation_contexts: presentation_contexts.clone(),
            user_variables,
        });

        Ok((pdu, presentation_contexts))
    }

    fn process_association_ac(
        &self,
        pdu: Pdu,
        presentation_contexts: Vec<PresentationContextProposed>,
    ) -> Result<(Vec<PresentationContextNegotiated>, u32)> {
        match pdu {
            Pdu::AssociationAC(AssociationAC {
                protocol_version: _,
                application_context_name: _,
                calling_ae_title: _,
                called_ae_title: _,
                presentation_contexts: accepted,
                user_variables,
            }) => {
                let negotiated: Vec<_> = accepted
                    .into_iter()
                    .filter(|pc| pc.reason == PresentationContextResultReason::Acceptance)
                    .filter_map(|pc| {
                        presentation_contexts
                            .iter()
                            .find(|proposed| proposed.id == pc.id)
                            .map(|proposed| PresentationContextNegotiated {
                                id: pc.id,
                                reason: pc.reason,
                                abstract_syntax: proposed.abstract_syntax.clone(),
                                transfer_syntax: pc.transfer_syntax,
                            })
                    })
                    .collect();

                let acceptor_max_pdu_length = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_MAX_PDU);
                let acceptor_max_pdu_length = if acceptor_max_pdu_length == 0 {
                    u32::MAX
                } else {
                    acceptor_max_pdu_length
                };

                Ok((negotiated, acceptor_max_pdu_length))
            }
            Pdu::AssociationRJ(association_rj) => RejectedSnafu { association_rj }.fail(),
            pdu @ Pdu::AbortRQ { .. }
            | pdu @ Pdu::AssociationRQ(_)
            | pdu @ Pdu::PData { .. }
            | pdu @ Pdu::ReleaseRQ
            | pdu @ Pdu::ReleaseRP => UnexpectedPduSnafu { pdu }.fail(),
            pdu @ Pdu::Unknown { .. } => UnknownPduSnafu { pdu }.fail(),
        }
    }

    /// Initiate the TCP connection and negotiate an association
    /// with the service class provider at the given address.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<ClientAssociation<TcpStream>> {
        let (request, presentation_contexts) = self.build_request()?;

        let mut socket = connect(address, self.socket_options.connection_timeout)?;
        socket
            .set_read_timeout(self.socket_options.read_timeout)
            .context(SetReadTimeoutSnafu)?;
        socket
            .set_write_timeout(self.socket_options.write_timeout)
            .context(SetWriteTimeoutSnafu)?;

        let mut write_buffer: Vec<u8> = Vec::with_capacity(self.max_pdu_length as usize);
        encode_pdu(&mut write_buffer, &request, self.max_pdu_length + PDU_HEADER_SIZE)?;
        socket.write_all(&write_buffer).context(WireSendSnafu)?;

        let mut read_buffer = BytesMut::with_capacity((self.max_pdu_length + PDU_HEADER_SIZE) as usize);
        let response = read_pdu_from_wire(&mut socket, &mut read_buffer, self.max_pdu_length, self.strict)?;
        let (presentation_contexts, acceptor_max_pdu_length) =
            self.process_association_ac(response, presentation_contexts)?;

        Ok(ClientAssociation {
            presentation_contexts,
            acceptor_max_pdu_length,
            requestor_max_pdu_length: self.max_pdu_length,
            socket,
            write_buffer,
            read_buffer,
            strict: self.strict,
            peer_ae_title: self.called_ae_title.to_string(),
            state: std::cell::Cell::new(crate::sm::State::Established),
        })
    }

    /// Initiate the TCP connection and negotiate an association
    /// over a TLS-secured transport.
    #[cfg(feature = "sync-tls")]
    pub fn establish_tls<A: ToSocketAddrs>(
        self,
        address: A,
        server_name: rustls::pki_types::ServerName<'static>,
    ) -> Result<ClientAssociation<TlsStream>> {
        let (request, presentation_contexts) = self.build_request()?;

        let tls_config = self
            .tls_config
            .clone()
            .context(super::TlsConfigMissingSnafu)?;

        let socket = connect(address, self.socket_options.connection_timeout)?;
        socket
            .set_read_timeout(self.socket_options.read_timeout)
            .context(SetReadTimeoutSnafu)?;
        socket
            .set_write_timeout(self.socket_options.write_timeout)
            .context(SetWriteTimeoutSnafu)?;

        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .context(super::TlsConnectionSnafu)?;
        let mut tls_stream = rustls::StreamOwned::new(conn, socket);

        let mut write_buffer: Vec<u8> = Vec::with_capacity(self.max_pdu_length as usize);
        encode_pdu(&mut write_buffer, &request, self.max_pdu_length + PDU_HEADER_SIZE)?;
        tls_stream.write_all(&write_buffer).context(WireSendSnafu)?;

        let mut read_buffer = BytesMut::with_capacity((self.max_pdu_length + PDU_HEADER_SIZE) as usize);
        let response = read_pdu_from_wire(&mut tls_stream, &mut read_buffer, self.max_pdu_length, self.strict)?;
        let (presentation_contexts, acceptor_max_pdu_length) =
            self.process_association_ac(response, presentation_contexts)?;

        Ok(ClientAssociation {
            presentation_contexts,
            acceptor_max_pdu_length,
            requestor_max_pdu_length: self.max_pdu_length,
            socket: tls_stream,
            write_buffer,
            read_buffer,
            strict: self.strict,
            peer_ae_title: self.called_ae_title.to_string(),
            state: std::cell::Cell::new(crate::sm::State::Established),
        })
    }

    /// Initiate the TCP connection and negotiate an association
    /// with the service class provider at the given address.
    #[cfg(feature = "async")]
    pub async fn establish_async<A>(self, address: A) -> Result<AsyncClientAssociation<tokio::net::TcpStream>>
    where
        A: tokio::net::ToSocketAddrs,
    {
        use tokio::io::AsyncWriteExt;

        let (request, presentation_contexts) = self.build_request()?;
        let connection_timeout = self.socket_options.connection_timeout;
        let read_timeout = self.socket_options.read_timeout;

        let mut socket = super::timeout(connection_timeout, async {
            tokio::net::TcpStream::connect(address)
                .await
                .context(ConnectSnafu)
        })
        .await?;

        let task = async {
            let mut write_buffer: Vec<u8> = Vec::with_capacity(self.max_pdu_length as usize);
            encode_pdu(&mut write_buffer, &request, self.max_pdu_length + PDU_HEADER_SIZE)?;
            socket.write_all(&write_buffer).await.context(WireSendSnafu)?;

            let mut read_buffer =
                BytesMut::with_capacity((self.max_pdu_length + PDU_HEADER_SIZE) as usize);
            let response = super::read_pdu_from_wire_async(
                &mut socket,
                &mut read_buffer,
                self.max_pdu_length,
                self.strict,
            )
            .await?;
            let (presentation_contexts, acceptor_max_pdu_length) =
                self.process_association_ac(response, presentation_contexts)?;

            Ok(AsyncClientAssociation {
                presentation_contexts,
                acceptor_max_pdu_length,
                requestor_max_pdu_length: self.max_pdu_length,
                socket,
                write_buffer,
                read_buffer,
                strict: self.strict,
                peer_ae_title: self.called_ae_title.to_string(),
                read_timeout: self.socket_options.read_timeout,
                write_timeout: self.socket_options.write_timeout,
            })
        };
        super::timeout(read_timeout, task).await
    }

    /// Initiate the TCP connection and negotiate an association
    /// over a TLS-secured transport.
    #[cfg(feature = "async-tls")]
    pub async fn establish_tls_async(
        self,
        address: impl tokio::net::ToSocketAddrs,
        server_name: rustls::pki_types::ServerName<'static>,
    ) -> Result<AsyncClientAssociation<AsyncTlsStream>> {
        use tokio::io::AsyncWriteExt;
        use tokio_rustls::TlsConnector;

        let (request, presentation_contexts) = self.build_request()?;
        let tls_config = self
            .tls_config
            .clone()
            .context(super::TlsConfigMissingSnafu)?;
        let connection_timeout = self.socket_options.connection_timeout;
        let read_timeout = self.socket_options.read_timeout;

        let socket = super::timeout(connection_timeout, async {
            tokio::net::TcpStream::connect(address)
                .await
                .context(ConnectSnafu)
        })
        .await?;

        let connector = TlsConnector::from(tls_config);
        let mut socket = connector
            .connect(server_name, socket)
            .await
            .context(ConnectSnafu)?;

        let task = async {
            let mut write_buffer: Vec<u8> = Vec::with_capacity(self.max_pdu_length as usize);
            encode_pdu(&mut write_buffer, &request, self.max_pdu_length + PDU_HEADER_SIZE)?;
            socket.write_all(&write_buffer).await.context(WireSendSnafu)?;

            let mut read_buffer =
                BytesMut::with_capacity((self.max_pdu_length + PDU_HEADER_SIZE) as usize);
            let response = super::read_pdu_from_wire_async(
                &mut socket,
                &mut read_buffer,
                self.max_pdu_length,
                self.strict,
            )
            .await?;
            let (presentation_contexts, acceptor_max_pdu_length) =
                self.process_association_ac(response, presentation_contexts)?;

            Ok(AsyncClientAssociation {
                presentation_contexts,
                acceptor_max_pdu_length,
                requestor_max_pdu_length: self.max_pdu_length,
                socket,
                write_buffer,
                read_buffer,
                strict: self.strict,
                peer_ae_title: self.called_ae_title.to_string(),
                read_timeout: self.socket_options.read_timeout,
                write_timeout: self.socket_options.write_timeout,
            })
        };
        super::timeout(read_timeout, task).await
    }
}

fn connect<A: ToSocketAddrs>(address: A, connection_timeout: Option<Duration>) -> Result<TcpStream> {
    match connection_timeout {
        Some(timeout) => {
            let addr = address
                .to_socket_addrs()
                .context(ConnectSnafu)?
                .next()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::InvalidInput))
                .context(ConnectSnafu)?;
            TcpStream::connect_timeout(&addr, timeout).context(ConnectSnafu)
        }
        None => TcpStream::connect(address).context(ConnectSnafu),
    }
}

/// A DICOM upper level association from the perspective
/// of a requesting application entity.
///
/// The most common operations of an established association are
/// [`send`](SyncAssociation::send) and [`receive`](SyncAssociation::receive).
///
/// When the value falls out of scope,
/// the program attempts to gracefully release the association
/// before shutting down the underlying TCP connection.
#[derive(Debug)]
pub struct ClientAssociation<S>
where
    S: std::io::Read + std::io::Write + CloseSocket,
{
    /// The accorded presentation contexts
    presentation_contexts: Vec<PresentationContextNegotiated>,
    /// The maximum PDU length that the acceptor is willing to receive
    acceptor_max_pdu_length: u32,
    /// The maximum PDU length that this application entity is expecting to receive
    requestor_max_pdu_length: u32,
    /// The TCP stream to the other DICOM node
    socket: S,
    /// Reusable buffer used for sending PDUs on the wire
    write_buffer: Vec<u8>,
    /// Read buffer from the socket
    read_buffer: BytesMut,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// The application entity title of the other DICOM node
    peer_ae_title: String,
    /// Place in the upper layer state machine, tracked from
    /// [`State::Established`](crate::sm::State::Established) onwards.
    state: std::cell::Cell<crate::sm::State>,
}

impl<S> Association for ClientAssociation<S>
where
    S: std::io::Read + std::io::Write + CloseSocket,
{
    fn presentation_contexts(&self) -> &[PresentationContextNegotiated] {
        &self.presentation_contexts
    }

    fn acceptor_max_pdu_length(&self) -> u32 {
        self.acceptor_max_pdu_length
    }

    fn requestor_max_pdu_length(&self) -> u32 {
        self.requestor_max_pdu_length
    }

    fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    fn user_variables(&self) -> &[UserVariableItem] {
        &[]
    }
}

impl<S> SyncAssociationSealed<S> for ClientAssociation<S>
where
    S: std::io::Read + std::io::Write + CloseSocket,
{
    fn send(&mut self, pdu: &Pdu) -> Result<()> {
        self.write_buffer.clear();
        encode_pdu(
            &mut self.write_buffer,
            pdu,
            self.acceptor_max_pdu_length + PDU_HEADER_SIZE,
        )?;
        self.socket.write_all(&self.write_buffer).context(WireSendSnafu)
    }

    fn receive(&mut self) -> Result<Pdu> {
        read_pdu_from_wire(
            &mut self.socket,
            &mut self.read_buffer,
            self.requestor_max_pdu_length,
            self.strict,
        )
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.socket.close()
    }

    fn sm_state(&self) -> &std::cell::Cell<crate::sm::State> {
        &self.state
    }
}

impl<S> SyncAssociation<S> for ClientAssociation<S>
where
    S: std::io::Read + std::io::Write + CloseSocket,
{
    fn inner_stream(&mut self) -> &mut S {
        &mut self.socket
    }

    fn get_mut(&mut self) -> (&mut S, &mut BytesMut) {
        let Self {
            socket, read_buffer, ..
        } = self;
        (socket, read_buffer)
    }
}

impl<S> Drop for ClientAssociation<S>
where
    S: std::io::Read + std::io::Write + CloseSocket,
{
    fn drop(&mut self) {
        let _ = SyncAssociation::release(self);
    }
}

/// An async DICOM upper level association from the perspective
/// of a requesting application entity.
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct AsyncClientAssociation<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    presentation_contexts: Vec<PresentationContextNegotiated>,
    acceptor_max_pdu_length: u32,
    requestor_max_pdu_length: u32,
    socket: S,
    write_buffer: Vec<u8>,
    read_buffer: BytesMut,
    strict: bool,
    peer_ae_title: String,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

#[cfg(feature = "async")]
impl<S> Association for AsyncClientAssociation<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    fn presentation_contexts(&self) -> &[PresentationContextNegotiated] {
        &self.presentation_contexts
    }

    fn acceptor_max_pdu_length(&self) -> u32 {
        self.acceptor_max_pdu_length
    }

    fn requestor_max_pdu_length(&self) -> u32 {
        self.requestor_max_pdu_length
    }

    fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    fn user_variables(&self) -> &[UserVariableItem] {
        &[]
    }
}

#[cfg(feature = "async")]
impl<S> crate::association::private::AsyncAssociationSealed<S> for AsyncClientAssociation<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, pdu: &Pdu) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.write_buffer.clear();
        super::timeout(self.write_timeout, async {
            encode_pdu(
                &mut self.write_buffer,
                pdu,
                self.acceptor_max_pdu_length + PDU_HEADER_SIZE,
            )?;
            self.socket
                .write_all(&self.write_buffer)
                .await
                .context(WireSendSnafu)
        })
        .await
    }

    async fn receive(&mut self) -> Result<Pdu> {
        super::timeout(self.read_timeout, async {
            super::read_pdu_from_wire_async(
                &mut self.socket,
                &mut self.read_buffer,
                self.requestor_max_pdu_length,
                self.strict,
            )
            .await
        })
        .await
    }

    async fn close(&mut self) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.socket.shutdown().await
    }
}

#[cfg(feature = "async")]
impl<S> crate::association::AsyncAssociation<S> for AsyncClientAssociation<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    fn inner_stream(&mut self) -> &mut S {
        &mut self.socket
    }

    fn get_mut(&mut self) -> (&mut S, &mut BytesMut) {
        let Self {
            socket, read_buffer, ..
        } = self;
        (socket, read_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_without_an_abstract_syntax() {
        let err = ClientAssociationOptions::new()
            .build_request()
            .unwrap_err();
        assert!(matches!(err, Error::MissingAbstractSyntax));
    }

    #[test]
    fn builds_presentation_contexts_with_default_transfer_syntaxes() {
        let (pdu, presentation_contexts) = ClientAssociationOptions::new()
            .with_abstract_syntax("1.2.840.10008.1.1")
            .build_request()
            .unwrap();

        assert_eq!(presentation_contexts.len(), 1);
        assert_eq!(presentation_contexts[0].id, 1);
        assert_eq!(
            presentation_contexts[0].transfer_syntaxes,
            vec!["1.2.840.10008.1.2.1", "1.2.840.10008.1.2"]
        );

        match pdu {
            Pdu::AssociationRQ(AssociationRQ { calling_ae_title, called_ae_title, .. }) => {
                assert_eq!(calling_ae_title, "THIS-SCU");
                assert_eq!(called_ae_title, "ANY-SCP");
            }
            other => panic!("unexpected PDU: {:?}", other),
        }
    }
}
