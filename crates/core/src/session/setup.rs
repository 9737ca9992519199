use super::Session;
use crate::protocol::Protocol;

/// Outcome of advancing the setup iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    /// SETUP was issued for this substream; its completion continues the
    /// iteration.
    Pending(usize),
    /// Every substream has been tried.
    Exhausted,
}

/// Walks a session's substreams in discovery order, one SETUP at a time.
///
/// Substreams that cannot be activated are logged and skipped without
/// issuing a SETUP. At most one SETUP is outstanding.
#[derive(Debug, Default)]
pub struct SubsessionController {
    next: usize,
    pending: Option<usize>,
}

impl SubsessionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue SETUP for the next substream that activates successfully.
    pub fn setup_next(&mut self, session: &mut Session, protocol: &mut dyn Protocol) -> SetupStep {
        self.pending = None;

        while let Some(substream) = session.substreams.get_mut(self.next) {
            self.next += 1;

            match protocol.activate(substream) {
                Ok(ports) => {
                    substream.client_ports = Some(ports);
                    tracing::debug!(
                        url = %protocol.url(),
                        substream = %substream.label(),
                        rtp_port = ports.rtp,
                        rtcp_port = ports.rtcp,
                        "initiated subsession"
                    );
                    protocol.send_setup(substream);
                    self.pending = Some(substream.index);
                    return SetupStep::Pending(substream.index);
                }
                Err(e) => {
                    tracing::warn!(
                        url = %protocol.url(),
                        substream = %substream.label(),
                        error = %e,
                        "failed to initiate subsession"
                    );
                }
            }
        }

        SetupStep::Exhausted
    }

    /// Substream whose SETUP is outstanding.
    pub fn pending(&self) -> Option<usize> {
        self.pending
    }

    /// Accept the completion for `index`. Returns `false` if no SETUP for
    /// that substream is outstanding.
    pub fn complete(&mut self, index: usize) -> bool {
        if self.pending == Some(index) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::sdp::parse_sdp;
    use crate::test_support::{Call, MockProtocol};

    fn session(substreams: usize) -> Session {
        let mut sdp = String::from("v=0\r\n");
        for i in 0..substreams {
            sdp.push_str(&format!(
                "m=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\na=control:track{i}\r\n"
            ));
        }
        Session::from_description(&parse_sdp(&sdp).unwrap(), "rtsp://h/s/")
    }

    #[test]
    fn one_setup_at_a_time_in_order() {
        let (mut protocol, calls) = MockProtocol::new();
        let mut session = session(2);
        let mut setup = SubsessionController::new();

        assert_eq!(setup.setup_next(&mut session, &mut protocol), SetupStep::Pending(0));
        assert_eq!(setup.pending(), Some(0));
        assert!(session.substreams[0].client_ports.is_some());
        assert!(session.substreams[1].client_ports.is_none());

        assert!(setup.complete(0));
        assert_eq!(setup.setup_next(&mut session, &mut protocol), SetupStep::Pending(1));
        assert!(setup.complete(1));
        assert_eq!(setup.setup_next(&mut session, &mut protocol), SetupStep::Exhausted);

        assert_eq!(
            calls.borrow().as_slice(),
            &[Call::Activate(0), Call::Setup(0), Call::Activate(1), Call::Setup(1)]
        );
    }

    #[test]
    fn failed_activations_are_skipped_without_setup() {
        let (mut protocol, calls) = MockProtocol::new();
        protocol.fail_activation(0);
        protocol.fail_activation(1);
        let mut session = session(3);
        let mut setup = SubsessionController::new();

        assert_eq!(setup.setup_next(&mut session, &mut protocol), SetupStep::Pending(2));
        assert_eq!(
            calls.borrow().as_slice(),
            &[Call::Activate(0), Call::Activate(1), Call::Activate(2), Call::Setup(2)]
        );
    }

    #[test]
    fn all_activations_failing_exhausts_immediately() {
        let (mut protocol, _calls) = MockProtocol::new();
        protocol.fail_activation(0);
        let mut session = session(1);
        let mut setup = SubsessionController::new();

        assert_eq!(setup.setup_next(&mut session, &mut protocol), SetupStep::Exhausted);
        assert_eq!(setup.pending(), None);
    }

    #[test]
    fn stale_completion_is_rejected() {
        let (mut protocol, _calls) = MockProtocol::new();
        let mut session = session(2);
        let mut setup = SubsessionController::new();

        setup.setup_next(&mut session, &mut protocol);
        assert!(!setup.complete(1));
        assert!(setup.complete(0));
        assert!(!setup.complete(0));
    }
}
