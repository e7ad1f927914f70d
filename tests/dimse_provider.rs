use std::net::SocketAddr;

use dicom_ul::ae::{ApplicationEntityOptions, PresentationContextDef};
use dicom_ul::association::{Association, SyncAssociation};
use dicom_ul::dimse::{self, DimseProvider};
use dicom_ul::pdu::commands::CEchoRsp;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync + 'static>>;

static SCU_AE_TITLE: &str = "ECHO-SCU";
static SCP_AE_TITLE: &str = "ECHO-SCP";

static IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
static VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

fn start_scp() -> Result<(dicom_ul::ae::Incoming, SocketAddr)> {
    let ae = ApplicationEntityOptions::new().ae_title(SCP_AE_TITLE);
    let contexts = [PresentationContextDef::new(
        VERIFICATION_SOP_CLASS,
        [IMPLICIT_VR_LE],
    )];
    let incoming = ae.start_server("localhost:0", &contexts)?;
    let addr = incoming.local_addr()?;
    Ok((incoming, addr))
}

fn connect_scu(scp_addr: SocketAddr) -> Result<dicom_ul::ClientAssociation<std::net::TcpStream>> {
    let ae = ApplicationEntityOptions::new().ae_title(SCU_AE_TITLE);
    let contexts = [PresentationContextDef::new(
        VERIFICATION_SOP_CLASS,
        [IMPLICIT_VR_LE],
    )];
    Ok(ae.associate(scp_addr, SCP_AE_TITLE, &contexts)?)
}

/// `DimseProvider::send_c_echo` correlates the response it gets back
/// against the Message ID it allocated for the request.
#[test]
fn send_c_echo_correlates_the_response() {
    let (mut incoming, scp_addr) = start_scp().unwrap();

    let h = std::thread::spawn(move || -> Result<()> {
        let (mut association, _peer) = incoming.accept()?;
        let message = dimse::receive_message(&mut association)?;
        let message_id = message.message_id().expect("request carries a Message ID");

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

    let mut association = connect_scu(scp_addr).unwrap();
    let presentation_context_id = association.presentation_contexts()[0].id;

    let mut provider = DimseProvider::new(&mut association, None);
    let response = provider
        .send_c_echo(presentation_context_id, VERIFICATION_SOP_CLASS)
        .expect("correlated response");
    assert_eq!(response.status(), Some(dimse::status::SUCCESS));
    assert!(provider.outstanding_service(presentation_context_id, 1).is_none());

    association.release().expect("did not have a peaceful release");
    h.join().expect("SCP thread panicked").expect("error at the SCP");
}

/// A response whose Message ID Being Responded To does not match any
/// outstanding request is a protocol error: the provider reports
/// `Error::Uncorrelated` and aborts the association rather than guessing.
#[test]
fn uncorrelated_response_is_rejected() {
    let (mut incoming, scp_addr) = start_scp().unwrap();

    let h = std::thread::spawn(move || -> Result<()> {
        let (mut association, _peer) = incoming.accept()?;
        let message = dimse::receive_message(&mut association)?;

        // answer with a Message ID that was never allocated by the SCU
        let response = CEchoRsp::builder()
            .message_id_being_responded_to(message.message_id().unwrap_or(0).wrapping_add(1000))
            .affected_sop_class_uid(VERIFICATION_SOP_CLASS)
            .status(dimse::status::SUCCESS)
            .build();
        dimse::send_command(&mut association, message.presentation_context_id, &response)?;

        // the SCU aborts rather than releasing; give it a moment and ignore
        // whatever PDU (or connection close) follows.
        let _ = association.receive();
        Ok(())
    });

    let mut association = connect_scu(scp_addr).unwrap();
    let presentation_context_id = association.presentation_contexts()[0].id;

    let mut provider = DimseProvider::new(&mut association, None);
    let err = provider
        .send_c_echo(presentation_context_id, VERIFICATION_SOP_CLASS)
        .expect_err("mismatched correlation must fail");
    assert!(matches!(err, dicom_ul::dimse::Error::Uncorrelated));

    h.join().expect("SCP thread panicked").expect("error at the SCP");
}
