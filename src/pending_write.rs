//! A small "pending write slot + retry guard", replacing the legacy
//! `ssl3_write_pending` helper.
//! The only behavior worth preserving from that helper is its bad-retry
//! detection: a retry must present the exact same buffer, content type,
//! and length as the attempt that returned `WouldBlock`.

use crate::content::ContentType;
use crate::error::{Error, Result};
use crate::transport::{Transport, WriteOutcome};

#[derive(Debug)]
struct Pending {
    buf: Vec<u8>,
    content_type: ContentType,
}

/// Tracks at most one in-flight write. A DTLS record layer emits one
/// record per datagram, so there is never more than one pending write
/// outstanding at a time.
#[derive(Default, Debug)]
pub struct PendingWrite {
    pending: Option<Pending>,
}

impl PendingWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Attempt to flush `buf` (a record of `content_type`) through
    /// `transport`. If a write was already pending, `buf`/`content_type`
    /// must match it exactly or this fails fatally with `BadWriteRetry`.
    pub fn send(
        &mut self,
        transport: &mut dyn Transport,
        content_type: ContentType,
        buf: &[u8],
    ) -> Result<WriteOutcome> {
        if let Some(pending) = &self.pending {
            if pending.content_type != content_type || pending.buf != buf {
                return Err(Error::BadWriteRetry);
            }
        }

        match transport.send(buf) {
            Ok(WriteOutcome::Sent) => {
                self.pending = None;
                Ok(WriteOutcome::Sent)
            }
            Ok(WriteOutcome::WouldBlock) => {
                self.pending = Some(Pending {
                    buf: buf.to_vec(),
                    content_type,
                });
                Ok(WriteOutcome::WouldBlock)
            }
            Err(e) => {
                // A send failure on a datagram transport is not
                // retried: datagrams are all-or-nothing from the
                // caller's perspective, so there is no partial state
                // worth keeping around.
                self.pending = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyTransport {
        fail_until: usize,
        calls: usize,
        sent: Vec<Vec<u8>>,
    }

    impl Transport for FlakyTransport {
        fn send(&mut self, buf: &[u8]) -> Result<WriteOutcome> {
            self.calls += 1;
            if self.calls <= self.fail_until {
                Ok(WriteOutcome::WouldBlock)
            } else {
                self.sent.push(buf.to_vec());
                Ok(WriteOutcome::Sent)
            }
        }
    }

    #[test]
    fn matching_retry_eventually_sends() {
        let mut t = FlakyTransport {
            fail_until: 2,
            calls: 0,
            sent: vec![],
        };
        let mut pw = PendingWrite::new();
        let buf = b"hello".to_vec();

        assert_eq!(
            pw.send(&mut t, ContentType::ApplicationData, &buf).unwrap(),
            WriteOutcome::WouldBlock
        );
        assert!(pw.has_pending());
        assert_eq!(
            pw.send(&mut t, ContentType::ApplicationData, &buf).unwrap(),
            WriteOutcome::WouldBlock
        );
        assert_eq!(
            pw.send(&mut t, ContentType::ApplicationData, &buf).unwrap(),
            WriteOutcome::Sent
        );
        assert!(!pw.has_pending());
        assert_eq!(t.sent, vec![buf]);
    }

    #[test]
    fn mismatched_retry_is_fatal() {
        let mut t = FlakyTransport {
            fail_until: 5,
            calls: 0,
            sent: vec![],
        };
        let mut pw = PendingWrite::new();
        pw.send(&mut t, ContentType::ApplicationData, b"hello")
            .unwrap();

        let err = pw
            .send(&mut t, ContentType::ApplicationData, b"world")
            .unwrap_err();
        assert!(matches!(err, Error::BadWriteRetry));

        let err = pw.send(&mut t, ContentType::Alert, b"hello").unwrap_err();
        assert!(matches!(err, Error::BadWriteRetry));
    }
}
