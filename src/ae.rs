//! Application entity configuration and connection/listening entry points.
//!
//! Ties association negotiation ([`crate::association`]) to the AE-level
//! concerns every DICOM node exposes: its own AE title, the timeouts
//! guarding each phase of an association's lifetime, the presentation
//! contexts it offers, and an access control policy deciding which peers
//! are admitted.

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use snafu::{ResultExt, Snafu};

use crate::association::client::ClientAssociationOptions;
use crate::association::server::{AccessControl, ServerAssociationOptions};
use crate::association::Association;
use crate::event::EventHandlers;
use crate::pdu::{AssociationRJServiceUserReason, UserIdentity};
use crate::{ClientAssociation, ServerAssociation};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// could not negotiate the association
    #[snafu(display("could not negotiate association"))]
    Association { source: crate::association::Error },

    /// could not bind the listening socket
    #[snafu(display("could not bind listening socket"))]
    Bind { source: std::io::Error },

    /// could not accept an incoming connection
    #[snafu(display("could not accept incoming connection"))]
    Accept { source: std::io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A presentation context to propose (as a requestor) or support (as an
/// acceptor): an abstract syntax UID together with the transfer syntaxes
/// offered alongside it.
#[derive(Debug, Clone)]
pub struct PresentationContextDef {
    pub abstract_syntax_uid: String,
    pub transfer_syntax_uids: Vec<String>,
}

impl PresentationContextDef {
    pub fn new(
        abstract_syntax_uid: impl Into<String>,
        transfer_syntax_uids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        PresentationContextDef {
            abstract_syntax_uid: abstract_syntax_uid.into(),
            transfer_syntax_uids: transfer_syntax_uids.into_iter().map(Into::into).collect(),
        }
    }
}

/// An access control policy admitting only the configured sets of calling
/// and/or called AE titles.
///
/// An empty list means "allow any value for this field", matching
/// `require_calling_aet` / `require_called_aet` left unset.
#[derive(Debug, Clone, Default)]
pub struct AeTitleAllowList {
    pub require_calling_aet: Vec<String>,
    pub require_called_aet: Vec<String>,
}

impl AccessControl for AeTitleAllowList {
    fn check_access(
        &self,
        _this_ae_title: &str,
        calling_ae_title: &str,
        called_ae_title: &str,
        _user_identity: Option<&UserIdentity>,
    ) -> std::result::Result<(), AssociationRJServiceUserReason> {
        if !self.require_calling_aet.is_empty()
            && !self
                .require_calling_aet
                .iter()
                .any(|title| title == calling_ae_title)
        {
            return Err(AssociationRJServiceUserReason::CallingAETitleNotRecognized);
        }
        if !self.require_called_aet.is_empty()
            && !self
                .require_called_aet
                .iter()
                .any(|title| title == called_ae_title)
        {
            return Err(AssociationRJServiceUserReason::CalledAETitleNotRecognized);
        }
        Ok(())
    }
}

/// Configuration for a DICOM application entity, gathering the options
/// relevant to both ends of an association: the AE title this node
/// presents, the timeouts bounding each phase of an association's life,
/// and the access control policy applied to incoming requests.
#[derive(Debug, Clone)]
pub struct ApplicationEntityOptions {
    pub ae_title: String,
    pub acse_timeout: Option<Duration>,
    pub dimse_timeout: Option<Duration>,
    pub network_timeout: Option<Duration>,
    pub connection_timeout: Option<Duration>,
    pub maximum_pdu_size: u32,
    pub strict: bool,
    pub require_calling_aet: Vec<String>,
    pub require_called_aet: Vec<String>,
}

impl Default for ApplicationEntityOptions {
    fn default() -> Self {
        ApplicationEntityOptions {
            ae_title: "ANY-SCU".to_string(),
            acse_timeout: None,
            dimse_timeout: None,
            network_timeout: None,
            connection_timeout: None,
            maximum_pdu_size: 16382,
            strict: false,
            require_calling_aet: Vec::new(),
            require_called_aet: Vec::new(),
        }
    }
}

impl ApplicationEntityOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ae_title(mut self, ae_title: impl Into<String>) -> Self {
        self.ae_title = ae_title.into();
        self
    }

    /// Bound the ACSE negotiation phase (A-ASSOCIATE exchange).
    pub fn acse_timeout(mut self, timeout: Duration) -> Self {
        self.acse_timeout = Some(timeout);
        self
    }

    /// Bound the wait for a matching DIMSE response once an association is established.
    pub fn dimse_timeout(mut self, timeout: Duration) -> Self {
        self.dimse_timeout = Some(timeout);
        self
    }

    /// Bound individual socket reads and writes.
    pub fn network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = Some(timeout);
        self
    }

    /// Bound the initial TCP handshake.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    pub fn maximum_pdu_size(mut self, value: u32) -> Self {
        self.maximum_pdu_size = value;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Restrict accepted associations to the given calling AE titles.
    /// An empty list (the default) admits any calling AE title.
    pub fn require_calling_aet(mut self, titles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.require_calling_aet = titles.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict accepted associations to the given called AE titles.
    /// An empty list (the default) admits any called AE title.
    pub fn require_called_aet(mut self, titles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.require_called_aet = titles.into_iter().map(Into::into).collect();
        self
    }

    fn access_control(&self) -> AeTitleAllowList {
        AeTitleAllowList {
            require_calling_aet: self.require_calling_aet.clone(),
            require_called_aet: self.require_called_aet.clone(),
        }
    }

    /// Open a TCP connection to `address` and negotiate an association as
    /// its requestor, proposing the given presentation contexts.
    pub fn associate<A>(
        &self,
        address: A,
        called_ae_title: &str,
        contexts: &[PresentationContextDef],
    ) -> Result<ClientAssociation<TcpStream>>
    where
        A: ToSocketAddrs,
    {
        let mut options = ClientAssociationOptions::new()
            .calling_ae_title(self.ae_title.clone())
            .called_ae_title(called_ae_title.to_string())
            .max_pdu_length(self.maximum_pdu_size)
            .strict(self.strict);

        if let Some(timeout) = self.connection_timeout {
            options = options.connection_timeout(timeout);
        }
        if let Some(timeout) = self.network_timeout {
            options = options.read_timeout(timeout).write_timeout(timeout);
        }
        for context in contexts {
            options = options.with_abstract_syntax(context.abstract_syntax_uid.clone());
            for ts in &context.transfer_syntax_uids {
                options = options.with_transfer_syntax(ts.clone());
            }
        }

        options.establish(address).context(AssociationSnafu)
    }

    fn server_options(
        &self,
        contexts: &[PresentationContextDef],
    ) -> ServerAssociationOptions<'static, AeTitleAllowList> {
        let mut options = ServerAssociationOptions::new()
            .ae_access_control(self.access_control())
            .ae_title(self.ae_title.clone())
            .max_pdu_length(self.maximum_pdu_size)
            .strict(self.strict);

        if let Some(timeout) = self.network_timeout {
            options = options.read_timeout(timeout).write_timeout(timeout);
        }
        for context in contexts {
            options = options.with_abstract_syntax(context.abstract_syntax_uid.clone());
            for ts in &context.transfer_syntax_uids {
                options = options.with_transfer_syntax(ts.clone());
            }
        }

        options
    }

    /// Bind `address` and return a handle to accept incoming association
    /// requests against the given presentation contexts, one at a time.
    pub fn start_server<A>(
        &self,
        address: A,
        contexts: &[PresentationContextDef],
    ) -> Result<Incoming>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(address).context(BindSnafu)?;
        Ok(Incoming {
            listener,
            options: self.server_options(contexts),
            events: EventHandlers::new(),
        })
    }
}

/// A bound listening socket, accepting and negotiating one association at
/// a time against a fixed set of presentation contexts.
///
/// Driving each accepted [`ServerAssociation`] (e.g. spawning a thread or
/// task per connection) is left to the caller. [`Event::Established`] is
/// fired automatically once negotiation succeeds; the remaining lifecycle
/// events ([`Event::CStore`], [`Event::Aborted`], [`Event::Released`]) are
/// not observable from here, since they occur while the caller is driving
/// the accepted association on its own thread or task -- fire them there
/// through the same [`EventHandlers`], e.g. by cloning out the handlers the
/// caller wants before moving the association off to its worker.
pub struct Incoming {
    listener: TcpListener,
    options: ServerAssociationOptions<'static, AeTitleAllowList>,
    events: EventHandlers,
}

impl Incoming {
    /// Register the event handlers fired as associations are accepted.
    pub fn with_events(mut self, events: EventHandlers) -> Self {
        self.events = events;
        self
    }

    /// Accept and negotiate the next incoming association.
    ///
    /// Blocks until a peer connects. A rejected or aborted negotiation is
    /// reported as an error without closing the listener; call this again
    /// to accept the next connection. On success, fires
    /// [`crate::event::Event::Established`] with the peer's AE title.
    pub fn accept(&mut self) -> Result<(ServerAssociation<TcpStream>, SocketAddr)> {
        let (socket, peer_addr) = self.listener.accept().context(AcceptSnafu)?;
        let association = self.options.establish(socket).context(AssociationSnafu)?;
        self.events.fire_established(association.peer_ae_title());
        Ok((association, peer_addr))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_admits_matching_titles() {
        let policy = AeTitleAllowList {
            require_calling_aet: vec!["SCU_A".to_string()],
            require_called_aet: vec!["SCP_A".to_string()],
        };

        assert!(policy
            .check_access("SCP_A", "SCU_A", "SCP_A", None)
            .is_ok());
        assert!(policy
            .check_access("SCP_A", "SCU_B", "SCP_A", None)
            .is_err());
        assert!(policy
            .check_access("SCP_A", "SCU_A", "SCP_B", None)
            .is_err());
    }

    #[test]
    fn allow_list_empty_admits_any_title() {
        let policy = AeTitleAllowList::default();
        assert!(policy.check_access("SCP_A", "ANYONE", "ANYONE", None).is_ok());
    }

    #[test]
    fn default_options_use_any_scu_title() {
        let options = ApplicationEntityOptions::default();
        assert_eq!(options.ae_title, "ANY-SCU");
        assert_eq!(options.maximum_pdu_size, 16382);
    }
}
