//! The Upper Layer state machine (DICOM PS3.8 §9, Table 9-10).
//!
//! This module has no I/O of its own: it is a pure function from
//! `(State, Event)` to `(State, actions)`. The association driving loop
//! (see [`crate::association`]) interprets the returned actions, performing
//! the socket writes, ARTIM arming, and indication callbacks they name.
//! Keeping the table pure makes it exhaustively unit-testable without a
//! socket: every `(State, Event)` pair is covered, undefined pairs fall
//! through to the AA-8 abort path rather than being left unhandled.

use smallvec::{smallvec, SmallVec};

/// One of the thirteen states of Table 9-10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Sta1: idle.
    Idle,
    /// Sta2: transport connection open, awaiting A-ASSOCIATE-RQ PDU (acceptor).
    AwaitingAssociateRq,
    /// Sta3: awaiting local A-ASSOCIATE response primitive (acceptor).
    AwaitingLocalAssociateResponse,
    /// Sta4: awaiting transport connection to open (requestor).
    AwaitingTransportConnection,
    /// Sta5: awaiting A-ASSOCIATE-AC or -RJ PDU (requestor).
    AwaitingAssociateResponse,
    /// Sta6: association established, ready for data transfer.
    Established,
    /// Sta7: awaiting A-RELEASE-RP PDU (requestor released).
    AwaitingReleaseResponse,
    /// Sta8: awaiting local A-RELEASE response primitive (acceptor).
    AwaitingLocalReleaseResponse,
    /// Sta9: release collision, requestor awaiting local response.
    ReleaseCollisionRequestorAwaitingResponse,
    /// Sta10: release collision, acceptor awaiting A-RELEASE-RP PDU.
    ReleaseCollisionAcceptorAwaitingReleaseRp,
    /// Sta11: release collision, requestor awaiting A-RELEASE-RP PDU.
    ReleaseCollisionRequestorAwaitingReleaseRp,
    /// Sta12: release collision, acceptor awaiting local response.
    ReleaseCollisionAcceptorAwaitingResponse,
    /// Sta13: awaiting transport connection close indication.
    AwaitingClose,
}

/// An event consumed by the state machine: a local service request, a
/// transport indication, a received PDU (one variant per PDU type), or a
/// timer expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Local user issued an A-ASSOCIATE request (requestor).
    AssociateRequest,
    /// Transport connection confirmed open (requestor).
    TransportConnectConfirm,
    /// Transport connection indicated as open (acceptor).
    TransportConnectIndication,
    /// An A-ASSOCIATE-RQ PDU arrived.
    RecvAssociateRq,
    /// Local user accepted a pending association request (acceptor).
    AssociateResponseAccept,
    /// Local user rejected a pending association request (acceptor).
    AssociateResponseReject,
    /// An A-ASSOCIATE-AC PDU arrived.
    RecvAssociateAc,
    /// An A-ASSOCIATE-RJ PDU arrived.
    RecvAssociateRj,
    /// A P-DATA-TF PDU arrived.
    RecvPData,
    /// Local user issued a P-DATA request.
    PDataRequest,
    /// An A-RELEASE-RQ PDU arrived.
    RecvReleaseRq,
    /// An A-RELEASE-RP PDU arrived.
    RecvReleaseRp,
    /// Local user issued an A-RELEASE request.
    ReleaseRequest,
    /// Local user issued an A-RELEASE response primitive.
    ReleaseResponse,
    /// Local user issued an A-ABORT request.
    AbortRequest,
    /// An A-ABORT PDU arrived.
    RecvAbort,
    /// The transport connection was closed by the peer or by us.
    TransportClosedIndication,
    /// The ARTIM timer expired.
    ArtimExpired,
    /// A PDU was received that could not be decoded, or was of an
    /// unrecognized type, or otherwise out of protocol.
    InvalidOrUnrecognizedPdu,
}

/// An action the caller of [`transition`] must carry out. Named after the
/// mnemonics of PS3.8 §9.3 (AE = association establishment, DT = data
/// transfer, AR = release, AA = abort).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// AE-1: issue a transport CONNECT request.
    IssueTransportConnect,
    /// AE-2: send the A-ASSOCIATE-RQ PDU.
    SendAssociateRq,
    /// AE-3: issue an A-ASSOCIATE confirmation (accept) to the local user.
    IndicateAssociateAccept,
    /// AE-4: issue an A-ASSOCIATE confirmation (reject); close the transport.
    IndicateAssociateRejectAndClose,
    /// AE-5: issue a transport connection response primitive; start ARTIM.
    IndicateTransportConnectedAndStartArtim,
    /// AE-6: stop ARTIM; issue an A-ASSOCIATE indication to the local user,
    /// or (if the RQ itself is unacceptable to the transport layer) reject.
    StopArtimAndIndicateAssociateRequest,
    /// AE-7: send the A-ASSOCIATE-AC PDU.
    SendAssociateAc,
    /// AE-8: send the A-ASSOCIATE-RJ PDU; start ARTIM.
    SendAssociateRjAndStartArtim,
    /// DT-1: send a P-DATA-TF PDU.
    SendPData,
    /// DT-2: issue a P-DATA indication to the local user.
    IndicatePData,
    /// AR-1: send the A-RELEASE-RQ PDU.
    SendReleaseRq,
    /// AR-2: issue an A-RELEASE indication to the local user.
    IndicateReleaseRequest,
    /// AR-3: issue an A-RELEASE confirmation; close the transport connection.
    IndicateReleaseConfirmAndClose,
    /// AR-4: send the A-RELEASE-RP PDU; start ARTIM.
    SendReleaseRpAndStartArtim,
    /// AR-5: stop ARTIM.
    StopArtim,
    /// AR-6: issue a P-DATA indication (while releasing).
    IndicatePDataWhileReleasing,
    /// AR-7: send a P-DATA-TF PDU (while releasing).
    SendPDataWhileReleasing,
    /// AR-8: issue an A-RELEASE indication for a release collision.
    IndicateReleaseCollision,
    /// AR-9: send the A-RELEASE-RP PDU (collision, acceptor side).
    SendReleaseRpCollision,
    /// AR-10: issue an A-RELEASE confirmation (collision, requestor side).
    IndicateReleaseConfirmCollision,
    /// AA-1: send the A-ABORT PDU; (re)start ARTIM.
    SendAbortAndStartArtim,
    /// AA-2: stop ARTIM; close the transport connection.
    StopArtimAndClose,
    /// AA-3: if this side did not request the abort, indicate A-P-ABORT and
    /// close the transport; otherwise await the close indication.
    IndicateProviderAbortIfUnsolicitedAndClose,
    /// AA-4: issue an A-P-ABORT indication to the local user.
    IndicateProviderAbort,
    /// AA-5: stop ARTIM (transport already closed).
    StopArtimOnClose,
    /// AA-6: ignore the PDU; remain awaiting transport close.
    Ignore,
    /// AA-7: send the A-ABORT PDU; remain awaiting transport close.
    SendAbort,
    /// AA-8: send the A-ABORT PDU, issue an A-P-ABORT indication, start
    /// ARTIM. The catch-all response to any undefined `(State, Event)` pair.
    SendAbortIndicateProviderAbortAndStartArtim,
}

pub type Actions = SmallVec<[Action; 3]>;

/// Advance the state machine by one event, returning the next state and the
/// ordered list of actions the caller must perform.
///
/// Every `(State, Event)` pair yields a result: pairs not explicitly listed
/// in Table 9-10 fall through to the AA-8 abort path (`send A-ABORT, issue
/// A-P-ABORT indication, start ARTIM, go to Sta13`), per the "no undefined
/// behavior" requirement on this table.
pub fn transition(state: State, event: Event) -> (State, Actions) {
    use Action::*;
    use Event::*;
    use State::*;

    match (state, event) {
        // --- Sta1: Idle ---
        (Idle, AssociateRequest) => (AwaitingTransportConnection, smallvec![IssueTransportConnect]),
        (Idle, TransportConnectIndication) => (
            AwaitingAssociateRq,
            smallvec![IndicateTransportConnectedAndStartArtim],
        ),

        // --- Sta2: awaiting A-ASSOCIATE-RQ (acceptor) ---
        (AwaitingAssociateRq, RecvAssociateRq) => (
            AwaitingLocalAssociateResponse,
            smallvec![StopArtimAndIndicateAssociateRequest],
        ),
        (AwaitingAssociateRq, TransportClosedIndication) => (Idle, smallvec![StopArtimOnClose]),
        (AwaitingAssociateRq, ArtimExpired) => (Idle, smallvec![StopArtimAndClose]),
        (AwaitingAssociateRq, InvalidOrUnrecognizedPdu) => {
            (AwaitingClose, smallvec![SendAbortAndStartArtim])
        }

        // --- Sta3: awaiting local A-ASSOCIATE response (acceptor) ---
        (AwaitingLocalAssociateResponse, AssociateResponseAccept) => {
            (Established, smallvec![SendAssociateAc])
        }
        (AwaitingLocalAssociateResponse, AssociateResponseReject) => (
            AwaitingClose,
            smallvec![SendAssociateRjAndStartArtim],
        ),
        (AwaitingLocalAssociateResponse, AbortRequest) => {
            (AwaitingClose, smallvec![SendAbortAndStartArtim])
        }
        (AwaitingLocalAssociateResponse, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }

        // --- Sta4: awaiting transport connection (requestor) ---
        (AwaitingTransportConnection, TransportConnectConfirm) => {
            (AwaitingAssociateResponse, smallvec![SendAssociateRq])
        }
        (AwaitingTransportConnection, AbortRequest) => (Idle, smallvec![]),

        // --- Sta5: awaiting A-ASSOCIATE-AC/RJ (requestor) ---
        (AwaitingAssociateResponse, RecvAssociateAc) => {
            (Established, smallvec![IndicateAssociateAccept])
        }
        (AwaitingAssociateResponse, RecvAssociateRj) => {
            (Idle, smallvec![IndicateAssociateRejectAndClose])
        }
        (AwaitingAssociateResponse, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }
        (AwaitingAssociateResponse, ArtimExpired) => (Idle, smallvec![StopArtimAndClose]),
        (AwaitingAssociateResponse, InvalidOrUnrecognizedPdu) => {
            (AwaitingClose, smallvec![SendAbortAndStartArtim])
        }

        // --- Sta6: Established ---
        (Established, PDataRequest) => (Established, smallvec![SendPData]),
        (Established, RecvPData) => (Established, smallvec![IndicatePData]),
        (Established, ReleaseRequest) => (AwaitingReleaseResponse, smallvec![SendReleaseRq]),
        (Established, RecvReleaseRq) => {
            (AwaitingLocalReleaseResponse, smallvec![IndicateReleaseRequest])
        }
        (Established, AbortRequest) => (AwaitingClose, smallvec![SendAbortAndStartArtim]),
        (Established, RecvAbort) => (Idle, smallvec![IndicateProviderAbort]),
        (Established, TransportClosedIndication) => (Idle, smallvec![IndicateProviderAbort]),
        (Established, InvalidOrUnrecognizedPdu) => {
            (AwaitingClose, smallvec![SendAbortAndStartArtim])
        }

        // --- Sta7: awaiting A-RELEASE-RP (requestor released) ---
        (AwaitingReleaseResponse, RecvReleaseRp) => {
            (Idle, smallvec![IndicateReleaseConfirmAndClose])
        }
        (AwaitingReleaseResponse, RecvReleaseRq) => (
            ReleaseCollisionRequestorAwaitingResponse,
            smallvec![IndicateReleaseCollision],
        ),
        // Open question resolved per design notes: P-DATA received here is
        // forwarded to the local user rather than rejected, tolerating a
        // peer that interleaves N-EVENT-REPORT during release.
        (AwaitingReleaseResponse, RecvPData) => {
            (AwaitingReleaseResponse, smallvec![IndicatePDataWhileReleasing])
        }
        (AwaitingReleaseResponse, RecvAbort) => (Idle, smallvec![IndicateProviderAbort]),
        (AwaitingReleaseResponse, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }

        // --- Sta8: awaiting local A-RELEASE response (acceptor) ---
        (AwaitingLocalReleaseResponse, ReleaseResponse) => {
            (AwaitingClose, smallvec![SendReleaseRpAndStartArtim])
        }
        (AwaitingLocalReleaseResponse, PDataRequest) => {
            (AwaitingLocalReleaseResponse, smallvec![SendPDataWhileReleasing])
        }
        (AwaitingLocalReleaseResponse, AbortRequest) => {
            (AwaitingClose, smallvec![SendAbortAndStartArtim])
        }
        (AwaitingLocalReleaseResponse, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }

        // --- Sta9: release collision, requestor awaiting local response ---
        (ReleaseCollisionRequestorAwaitingResponse, ReleaseResponse) => (
            ReleaseCollisionRequestorAwaitingReleaseRp,
            smallvec![SendReleaseRpCollision],
        ),
        (ReleaseCollisionRequestorAwaitingResponse, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }

        // --- Sta10: release collision, acceptor awaiting A-RELEASE-RP ---
        (ReleaseCollisionAcceptorAwaitingReleaseRp, RecvReleaseRp) => {
            (AwaitingLocalReleaseResponse, smallvec![])
        }
        (ReleaseCollisionAcceptorAwaitingReleaseRp, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }

        // --- Sta11: release collision, requestor awaiting A-RELEASE-RP ---
        (ReleaseCollisionRequestorAwaitingReleaseRp, RecvReleaseRp) => {
            (Idle, smallvec![IndicateReleaseConfirmCollision])
        }
        (ReleaseCollisionRequestorAwaitingReleaseRp, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }

        // --- Sta12: release collision, acceptor awaiting local response ---
        (ReleaseCollisionAcceptorAwaitingResponse, ReleaseResponse) => {
            (ReleaseCollisionAcceptorAwaitingReleaseRp, smallvec![SendReleaseRpCollision])
        }
        (ReleaseCollisionAcceptorAwaitingResponse, TransportClosedIndication) => {
            (Idle, smallvec![IndicateProviderAbort])
        }

        // --- Sta13: awaiting transport close ---
        (AwaitingClose, TransportClosedIndication) => (Idle, smallvec![StopArtimOnClose]),
        (AwaitingClose, ArtimExpired) => (Idle, smallvec![StopArtimAndClose]),
        // any PDU arriving while we wait for the socket to close is
        // discarded; ARTIM alone governs the forced close.
        (AwaitingClose, RecvAssociateRq)
        | (AwaitingClose, RecvAssociateAc)
        | (AwaitingClose, RecvAssociateRj)
        | (AwaitingClose, RecvPData)
        | (AwaitingClose, RecvReleaseRq)
        | (AwaitingClose, RecvReleaseRp)
        | (AwaitingClose, RecvAbort)
        | (AwaitingClose, InvalidOrUnrecognizedPdu) => (AwaitingClose, smallvec![Ignore]),

        // A-ABORT arriving anywhere is a provider abort unless we were
        // already closing, handled above.
        (_, RecvAbort) => (Idle, smallvec![IndicateProviderAbort]),

        // Any other event undefined for the current state: AA-8.
        _ => (AwaitingClose, smallvec![SendAbortIndicateProviderAbortAndStartArtim]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(State::Idle, Event::AssociateRequest)]
    #[case(State::Established, Event::PDataRequest)]
    #[case(State::Established, Event::ReleaseRequest)]
    #[case(State::AwaitingAssociateRq, Event::RecvAssociateRq)]
    fn known_transitions_do_not_abort(#[case] state: State, #[case] event: Event) {
        let (_next, actions) = transition(state, event);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::SendAbortIndicateProviderAbortAndStartArtim)));
    }

    /// SM totality: every (state, event) pair must yield a defined
    /// transition, which in the worst case is the AA-8 abort path --
    /// never a panic and never "no transition".
    #[test]
    fn every_state_event_pair_is_total() {
        let states = [
            State::Idle,
            State::AwaitingAssociateRq,
            State::AwaitingLocalAssociateResponse,
            State::AwaitingTransportConnection,
            State::AwaitingAssociateResponse,
            State::Established,
            State::AwaitingReleaseResponse,
            State::AwaitingLocalReleaseResponse,
            State::ReleaseCollisionRequestorAwaitingResponse,
            State::ReleaseCollisionAcceptorAwaitingReleaseRp,
            State::ReleaseCollisionRequestorAwaitingReleaseRp,
            State::ReleaseCollisionAcceptorAwaitingResponse,
            State::AwaitingClose,
        ];
        let events = [
            Event::AssociateRequest,
            Event::TransportConnectConfirm,
            Event::TransportConnectIndication,
            Event::RecvAssociateRq,
            Event::AssociateResponseAccept,
            Event::AssociateResponseReject,
            Event::RecvAssociateAc,
            Event::RecvAssociateRj,
            Event::RecvPData,
            Event::PDataRequest,
            Event::RecvReleaseRq,
            Event::RecvReleaseRp,
            Event::ReleaseRequest,
            Event::ReleaseResponse,
            Event::AbortRequest,
            Event::RecvAbort,
            Event::TransportClosedIndication,
            Event::ArtimExpired,
            Event::InvalidOrUnrecognizedPdu,
        ];

        for &state in &states {
            for &event in &events {
                // must not panic; every pair is handled.
                let _ = transition(state, event);
            }
        }
    }

    #[test]
    fn undefined_pair_falls_through_to_aa8() {
        // P-DATA request while idle is never valid: AA-8 catch-all applies.
        let (next, actions) = transition(State::Idle, Event::PDataRequest);
        assert_eq!(next, State::AwaitingClose);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SendAbortIndicateProviderAbortAndStartArtim)));
    }

    #[test]
    fn sta13_silently_discards_arriving_pdus() {
        // once AA-8 has been triggered, any further PDU is ignored rather
        // than acted upon -- only the transport close or ARTIM governs the
        // way out of Sta13.
        let (s, _) = transition(State::Established, Event::InvalidOrUnrecognizedPdu);
        assert_eq!(s, State::AwaitingClose);
        for event in [
            Event::RecvPData,
            Event::RecvReleaseRq,
            Event::RecvReleaseRp,
            Event::RecvAssociateRq,
        ] {
            let (next, actions) = transition(s, event);
            assert_eq!(next, State::AwaitingClose);
            assert!(actions.iter().any(|a| matches!(a, Action::Ignore)));
        }
    }

    #[test]
    fn sta7_forwards_pdata_while_releasing() {
        // a P-DATA-TF crossing our own A-RELEASE-RQ on the wire is
        // delivered to the local user rather than rejected.
        let (s, _) = transition(State::Established, Event::ReleaseRequest);
        assert_eq!(s, State::AwaitingReleaseResponse);
        let (next, actions) = transition(s, Event::RecvPData);
        assert_eq!(next, State::AwaitingReleaseResponse);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::IndicatePDataWhileReleasing)));
    }

    #[test]
    fn release_collision_converges_to_idle() {
        // both peers in Sta6 issue A-RELEASE-RQ: requestor sees Sta7, then
        // receives the peer's RQ (collision) and, after issuing its own
        // local release response, converges through Sta9/Sta11 to Idle.
        let (s, _) = transition(State::Established, Event::ReleaseRequest);
        assert_eq!(s, State::AwaitingReleaseResponse);
        let (s, _) = transition(s, Event::RecvReleaseRq);
        assert_eq!(s, State::ReleaseCollisionRequestorAwaitingResponse);
        let (s, _) = transition(s, Event::ReleaseResponse);
        assert_eq!(s, State::ReleaseCollisionRequestorAwaitingReleaseRp);
        let (s, _) = transition(s, Event::RecvReleaseRp);
        assert_eq!(s, State::Idle);
    }
}
