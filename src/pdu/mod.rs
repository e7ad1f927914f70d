//! PDU module - contains the types and encoding/decoding primitives for
//! Upper Layer protocol data units, as described in Part 8 of the standard.
pub mod commands;
pub mod generated;
pub mod reader;
pub mod writer;

pub use reader::{
    read_pdu, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE, MINIMUM_PDU_SIZE, PDU_HEADER_SIZE,
};
pub use writer::write_pdu;

/// The largest PDU size this implementation will allocate a single read
/// buffer for, regardless of what a peer's maximum PDU length user variable
/// advertises. Acts as a sane upper bound distinct from the protocol-level
/// [`MAXIMUM_PDU_SIZE`].
pub const LARGE_PDU_SIZE: u32 = 16_384;

/// A presentation context, as proposed by an association requestor.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextProposed {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

/// A presentation context, as it appears in an A-ASSOCIATE-AC PDU.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextResult {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub transfer_syntax: String,
}

/// The outcome of negotiating a single presentation context,
/// combining the requestor's abstract syntax proposal with the
/// acceptor's chosen transfer syntax and result reason.
///
/// Unlike [`PresentationContextProposed`] and [`PresentationContextResult`],
/// which mirror the wire encoding of their respective PDUs,
/// this type represents the context as agreed for the remainder
/// of the association.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PresentationContextNegotiated {
    pub id: u8,
    pub reason: PresentationContextResultReason,
    pub abstract_syntax: String,
    pub transfer_syntax: String,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PresentationContextResultReason {
    Acceptance = 0,
    UserRejection = 1,
    NoReason = 2,
    AbstractSyntaxNotSupported = 3,
    TransferSyntaxesNotSupported = 4,
}

impl PresentationContextResultReason {
    pub fn from(value: u8) -> Option<Self> {
        match value {
            0 => Some(PresentationContextResultReason::Acceptance),
            1 => Some(PresentationContextResultReason::UserRejection),
            2 => Some(PresentationContextResultReason::NoReason),
            3 => Some(PresentationContextResultReason::AbstractSyntaxNotSupported),
            4 => Some(PresentationContextResultReason::TransferSyntaxesNotSupported),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJResult {
    Permanent,
    Transient,
}

impl AssociationRJResult {
    pub fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(AssociationRJResult::Permanent),
            2 => Some(AssociationRJResult::Transient),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJSource {
    ServiceUser(AssociationRJServiceUserReason),
    ServiceProviderASCE(AssociationRJServiceProviderASCEReason),
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            1 => Some(AssociationRJSource::ServiceUser(match reason {
                1 => AssociationRJServiceUserReason::NoReasonGiven,
                2 => AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
                3 => AssociationRJServiceUserReason::CallingAETitleNotRecognized,
                7 => AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                other => AssociationRJServiceUserReason::Reserved(other),
            })),
            2 => Some(AssociationRJSource::ServiceProviderASCE(match reason {
                1 => AssociationRJServiceProviderASCEReason::NoReasonGiven,
                2 => AssociationRJServiceProviderASCEReason::ProtocolVersionNotSupported,
                _ => return None,
            })),
            3 => Some(AssociationRJSource::ServiceProviderPresentation(match reason {
                1 => AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
                2 => AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
                other => AssociationRJServiceProviderPresentationReason::Reserved(other),
            })),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceUserReason {
    NoReasonGiven,
    ApplicationContextNameNotSupported,
    CallingAETitleNotRecognized,
    CalledAETitleNotRecognized,
    Reserved(u8),
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderASCEReason {
    NoReasonGiven,
    ProtocolVersionNotSupported,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AssociationRJServiceProviderPresentationReason {
    TemporaryCongestion,
    LocalLimitExceeded,
    Reserved(u8),
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct PDataValue {
    pub presentation_context_id: u8,
    pub value_type: PDataValueType,
    pub is_last: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PDataValueType {
    Command,
    Data,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQSource {
    ServiceUser,
    Reserved,
    ServiceProvider(AbortRQServiceProviderReason),
}

impl AbortRQSource {
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            0 => Some(AbortRQSource::ServiceUser),
            1 => Some(AbortRQSource::Reserved),
            2 => Some(AbortRQSource::ServiceProvider(match reason {
                0 => AbortRQServiceProviderReason::ReasonNotSpecified,
                1 => AbortRQServiceProviderReason::UnrecognizedPdu,
                2 => AbortRQServiceProviderReason::UnexpectedPdu,
                3 => AbortRQServiceProviderReason::Reserved,
                4 => AbortRQServiceProviderReason::UnrecognizedPduParameter,
                5 => AbortRQServiceProviderReason::UnexpectedPduParameter,
                6 => AbortRQServiceProviderReason::InvalidPduParameter,
                _ => return None,
            })),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum AbortRQServiceProviderReason {
    ReasonNotSpecified,
    UnrecognizedPdu,
    UnexpectedPdu,
    Reserved,
    UnrecognizedPduParameter,
    UnexpectedPduParameter,
    InvalidPduParameter,
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum PduVariableItem {
    Unknown(u8),
    ApplicationContext(String),
    PresentationContextProposed(PresentationContextProposed),
    PresentationContextResult(PresentationContextResult),
    UserVariables(Vec<UserVariableItem>),
}

#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserVariableItem {
    Unknown(u8, Vec<u8>),
    MaxLength(u32),
    ImplementationClassUID(String),
    ImplementationVersionName(String),
    SopClassExtendedNegotiationSubItem(String, Vec<u8>),
    UserIdentityItem(UserIdentity),
    AsynchronousOperationsWindow(AsynchronousOperationsWindow),
    RoleSelection(RoleSelection),
    SopClassCommonExtendedNegotiationSubItem(SopClassCommonExtendedNegotiation),
    UserIdentityServerResponse(Vec<u8>),
}

/// Asynchronous Operations Window sub-item (item type 53H),
/// negotiating the maximum number of outstanding operations
/// each peer may invoke or perform concurrently.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AsynchronousOperationsWindow {
    pub max_operations_invoked: u16,
    pub max_operations_performed: u16,
}

/// SCP/SCU Role Selection sub-item (item type 54H),
/// negotiating which peer acts as SCU and/or SCP
/// for a given abstract syntax.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct RoleSelection {
    pub sop_class_uid: String,
    pub scu_role_supported: bool,
    pub scp_role_supported: bool,
}

/// SOP Class Common Extended Negotiation sub-item (item type 57H).
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct SopClassCommonExtendedNegotiation {
    pub sop_class_uid: String,
    pub service_class_uid: String,
    pub related_general_sop_class_uids: Vec<String>,
}

/// The requestor's identity, as negotiated through the User Identity
/// Negotiation sub-item (item type 58H).
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct UserIdentity {
    positive_response_requested: bool,
    identity_type: UserIdentityType,
    primary_field: Vec<u8>,
    secondary_field: Vec<u8>,
}

impl UserIdentity {
    pub fn new(
        positive_response_requested: bool,
        identity_type: UserIdentityType,
        primary_field: Vec<u8>,
        secondary_field: Vec<u8>,
    ) -> Self {
        UserIdentity {
            positive_response_requested,
            identity_type,
            primary_field,
            secondary_field,
        }
    }

    pub fn positive_response_requested(&self) -> bool {
        self.positive_response_requested
    }

    pub fn identity_type(&self) -> UserIdentityType {
        self.identity_type
    }

    pub fn primary_field(&self) -> &[u8] {
        &self.primary_field
    }

    pub fn secondary_field(&self) -> &[u8] {
        &self.secondary_field
    }
}

/// The kind of credential carried by a [`UserIdentity`].
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum UserIdentityType {
    Username,
    UsernameAndPasscode,
    Kerberos,
    Saml,
    Jwt,
}

impl UserIdentityType {
    pub fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(UserIdentityType::Username),
            2 => Some(UserIdentityType::UsernameAndPasscode),
            3 => Some(UserIdentityType::Kerberos),
            4 => Some(UserIdentityType::Saml),
            5 => Some(UserIdentityType::Jwt),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            UserIdentityType::Username => 1,
            UserIdentityType::UsernameAndPasscode => 2,
            UserIdentityType::Kerberos => 3,
            UserIdentityType::Saml => 4,
            UserIdentityType::Jwt => 5,
        }
    }
}

/// A-ASSOCIATE-RQ PDU contents.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AssociationRQ {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextProposed>,
    pub user_variables: Vec<UserVariableItem>,
}

/// A-ASSOCIATE-AC PDU contents.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AssociationAC {
    pub protocol_version: u16,
    pub calling_ae_title: String,
    pub called_ae_title: String,
    pub application_context_name: String,
    pub presentation_contexts: Vec<PresentationContextResult>,
    pub user_variables: Vec<UserVariableItem>,
}

/// A-ASSOCIATE-RJ PDU contents.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub struct AssociationRJ {
    pub result: AssociationRJResult,
    pub source: AssociationRJSource,
}

/// A decoded DICOM Upper Layer protocol data unit.
#[derive(Clone, Eq, PartialEq, PartialOrd, Hash, Debug)]
pub enum Pdu {
    AssociationRQ(AssociationRQ),
    AssociationAC(AssociationAC),
    AssociationRJ(AssociationRJ),
    PData { data: Vec<PDataValue> },
    ReleaseRQ,
    ReleaseRP,
    AbortRQ { source: AbortRQSource },
    Unknown { pdu_type: u8, data: Vec<u8> },
}

#[derive(Debug, snafu::Snafu)]
#[non_exhaustive]
pub enum WriteError {
    #[snafu(display("Could not write PDU field `{}`", field))]
    WriteField {
        field: &'static str,
        backtrace: snafu::Backtrace,
        source: std::io::Error,
    },

    #[snafu(display("Could not write {} reserved bytes", bytes))]
    WriteReserved {
        bytes: u32,
        backtrace: snafu::Backtrace,
        source: std::io::Error,
    },

    #[snafu(display("Could not encode field `{}`", field))]
    EncodeField {
        field: &'static str,
        #[snafu(backtrace)]
        source: dicom_encoding::text::EncodeTextError,
    },

    #[snafu(display("Could not write chunk `{}`", name))]
    WriteChunk {
        name: &'static str,
        #[snafu(backtrace)]
        source: writer::WriteChunkError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_associate_rq_with_role_selection_and_user_identity() {
        let rq = Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "SCU_AE".to_string(),
            called_ae_title: "SCP_AE".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
            }],
            user_variables: vec![
                UserVariableItem::MaxLength(16_384),
                UserVariableItem::RoleSelection(RoleSelection {
                    sop_class_uid: "1.2.840.10008.1.1".to_string(),
                    scu_role_supported: true,
                    scp_role_supported: false,
                }),
                UserVariableItem::AsynchronousOperationsWindow(AsynchronousOperationsWindow {
                    max_operations_invoked: 1,
                    max_operations_performed: 1,
                }),
                UserVariableItem::UserIdentityItem(UserIdentity::new(
                    true,
                    UserIdentityType::UsernameAndPasscode,
                    b"alice".to_vec(),
                    b"hunter2".to_vec(),
                )),
            ],
        });

        let mut bytes = vec![];
        write_pdu(&mut bytes, &rq).unwrap();

        let decoded = read_pdu(&mut Cursor::new(bytes), MINIMUM_PDU_SIZE, true).unwrap();
        match decoded {
            Pdu::AssociationRQ(AssociationRQ {
                calling_ae_title,
                called_ae_title,
                presentation_contexts,
                user_variables,
                ..
            }) => {
                assert_eq!(calling_ae_title, "SCU_AE");
                assert_eq!(called_ae_title, "SCP_AE");
                assert_eq!(presentation_contexts.len(), 1);
                assert!(user_variables
                    .iter()
                    .any(|v| matches!(v, UserVariableItem::RoleSelection(_))));
                assert!(user_variables.iter().any(
                    |v| matches!(v, UserVariableItem::AsynchronousOperationsWindow(_))
                ));
                assert!(user_variables
                    .iter()
                    .any(|v| matches!(v, UserVariableItem::UserIdentityItem(_))));
            }
            other => panic!("unexpected PDU: {:?}", other),
        }
    }

    #[test]
    fn round_trips_sop_class_common_extended_negotiation() {
        let item = SopClassCommonExtendedNegotiation {
            sop_class_uid: "1.2.840.10008.5.1.4.1.1.7".to_string(),
            service_class_uid: "1.2.840.10008.4.2".to_string(),
            related_general_sop_class_uids: vec![
                "1.2.840.10008.5.1.4.1.1.1".to_string(),
                "1.2.840.10008.5.1.4.1.1.2".to_string(),
            ],
        };

        let mut bytes = vec![];
        crate::pdu::writer::write_pdu(
            &mut bytes,
            &Pdu::AssociationRQ(AssociationRQ {
                protocol_version: 1,
                calling_ae_title: "A".to_string(),
                called_ae_title: "B".to_string(),
                application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
                presentation_contexts: vec![PresentationContextProposed {
                    id: 1,
                    abstract_syntax: "1.2.840.10008.1.1".to_string(),
                    transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
                }],
                user_variables: vec![UserVariableItem::SopClassCommonExtendedNegotiationSubItem(
                    item.clone(),
                )],
            }),
        )
        .unwrap();

        let decoded = read_pdu(&mut Cursor::new(bytes), MINIMUM_PDU_SIZE, true).unwrap();
        match decoded {
            Pdu::AssociationRQ(AssociationRQ { user_variables, .. }) => {
                assert_eq!(
                    user_variables,
                    vec![UserVariableItem::SopClassCommonExtendedNegotiationSubItem(item)]
                );
            }
            other => panic!("unexpected PDU: {:?}", other),
        }
    }

    #[test]
    fn abort_rq_source_roundtrips_through_byte_pairs() {
        assert_eq!(AbortRQSource::from(0, 0), Some(AbortRQSource::ServiceUser));
        assert_eq!(AbortRQSource::from(1, 0), Some(AbortRQSource::Reserved));
        assert_eq!(
            AbortRQSource::from(2, 6),
            Some(AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::InvalidPduParameter
            ))
        );
        assert_eq!(AbortRQSource::from(9, 0), None);
    }

    #[test]
    fn association_rj_source_distinguishes_reserved_codes() {
        assert_eq!(
            AssociationRJSource::from(1, 5),
            Some(AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::Reserved(5)
            ))
        );
        assert_eq!(
            AssociationRJSource::from(3, 0),
            Some(AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::Reserved(0)
            ))
        );
    }
}
