use bytes::Bytes;
use tracing::trace;

const TOKEN_LEN: usize = 8;

/// Issues the write tokens handed out in `get_peers` replies.
///
/// An `announce_peer` is only honoured if it echoes the current token or
/// the one it replaced at the last rotation, which bounds how long a
/// captured token can be replayed to two rotation periods.
#[derive(Debug)]
pub struct TokenIssuer {
    current: Bytes,
    previous: Bytes,
}

impl TokenIssuer {
    pub fn new() -> Self {
        // An empty previous token never validates.
        Self {
            current: fresh_token(),
            previous: Bytes::new(),
        }
    }

    pub fn current(&self) -> Bytes {
        self.current.clone()
    }

    pub fn is_valid(&self, candidate: &[u8]) -> bool {
        !candidate.is_empty()
            && (candidate == self.current.as_ref() || candidate == self.previous.as_ref())
    }

    pub fn rotate(&mut self) {
        self.previous = std::mem::replace(&mut self.current, fresh_token());
        trace!("announce token rotated");
    }
}

impl Default for TokenIssuer {
    fn default() -> Self {
        Self::new()
    }
}

fn fresh_token() -> Bytes {
    let token: [u8; TOKEN_LEN] = rand::random();
    Bytes::copy_from_slice(&token)
}
