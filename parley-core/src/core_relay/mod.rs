/*
    core_relay - Persisted message delivery

    Handles:
    - Text, voice and file messages
    - Persist-then-forward to the receiver's live connection
    - Acknowledgements back to the sender
*/

pub mod relay;

pub use relay::{Ack, MessageRelay, RelayRequest};
