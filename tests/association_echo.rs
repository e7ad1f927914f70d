use std::net::SocketAddr;

use dicom_ul::ae::{ApplicationEntityOptions, PresentationContextDef};
use dicom_ul::association::{Association, SyncAssociation};
use dicom_ul::dimse;
use dicom_ul::pdu::commands::{CEchoRq, CEchoRsp};
use dicom_ul::pdu::{PresentationContextNegotiated, PresentationContextResultReason};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync + 'static>>;

static SCU_AE_TITLE: &str = "ECHO-SCU";
static SCP_AE_TITLE: &str = "ECHO-SCP";

static IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
static VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

fn spawn_scp() -> Result<(std::thread::JoinHandle<Result<()>>, SocketAddr)> {
    let ae = ApplicationEntityOptions::new().ae_title(SCP_AE_TITLE);
    let contexts = [PresentationContextDef::new(
        VERIFICATION_SOP_CLASS,
        [IMPLICIT_VR_LE],
    )];
    let mut incoming = ae.start_server("localhost:0", &contexts)?;
    let addr = incoming.local_addr()?;

    let h = std::thread::spawn(move || -> Result<()> {
        let (mut association, _peer) = incoming.accept()?;

        assert_eq!(
            association.presentation_contexts(),
            &[PresentationContextNegotiated {
                id: 1,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: IMPLICIT_VR_LE.to_string(),
                abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
            }],
        );

        let message = dimse::receive_message(&mut association)?;
        assert_eq!(
            message.command_field(),
            Some(dicom_ul::pdu::commands::CommandField::C_ECHO_RQ)
        );
        let message_id = message.message_id().expect("request carries a Message ID");
        assert_eq!(
            message.affected_sop_class_uid().as_deref(),
            Some(VERIFICATION_SOP_CLASS)
        );
        assert!(message.dataset.is_none());

        let response = CEchoRsp::builder()
            .message_id_being_responded_to(message_id)
            .affected_sop_class_uid(VERIFICATION_SOP_CLASS)
            .status(dimse::status::SUCCESS)
            .build();
        dimse::send_command(&mut association, message.presentation_context_id, &response)?;

        let pdu = association.receive()?;
        assert_eq!(pdu, dicom_ul::pdu::Pdu::ReleaseRQ);
        association.send(&dicom_ul::pdu::Pdu::ReleaseRP)?;
        Ok(())
    });
    Ok((h, addr))
}

/// A C-ECHO request sent by an SCU is answered with a success response,
/// and the association is released cleanly afterwards.
#[test]
fn c_echo_round_trip() {
    let (scp_handle, scp_addr) = spawn_scp().unwrap();

    let ae = ApplicationEntityOptions::new().ae_title(SCU_AE_TITLE);
    let contexts = [PresentationContextDef::new(
        VERIFICATION_SOP_CLASS,
        [IMPLICIT_VR_LE],
    )];
    let mut association = ae.associate(scp_addr, SCP_AE_TITLE, &contexts).unwrap();

    let presentation_context_id = association.presentation_contexts()[0].id;

    let request = CEchoRq::builder()
        .message_id(1)
        .affected_sop_class_uid(VERIFICATION_SOP_CLASS)
        .build();
    dimse::send_command(&mut association, presentation_context_id, &request).unwrap();

    let response = dimse::receive_message(&mut association).unwrap();
    assert_eq!(response.message_id_being_responded_to(), Some(1));
    assert_eq!(response.status(), Some(dimse::status::SUCCESS));

    association.release().expect("did not have a peaceful release");

    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("error at the SCP");
}
