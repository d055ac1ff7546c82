//! Wire-format contract tests
//!
//! These pin the boundary-crossing spellings. Changing any of them
//! breaks interoperability with deployed counterparts, so a failure here
//! means a deliberate protocol revision, not a refactor.

// ===== Envelope field names (stable contract) =====
pub const FIELD_MSG_ID: &str = "msgId";
pub const FIELD_KIND: &str = "mType";
pub const FIELD_PAYLOAD: &str = "payload";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_REPLY_TO: &str = "rMsgId";
pub const FIELD_ERROR: &str = "error";

// ===== Message kind spellings (stable contract) =====
pub const KIND_SEND: &str = "rpcSend";
pub const KIND_SEND_AND_RECEIVE: &str = "rpcSendAndReceive";
pub const KIND_REPLY: &str = "rpcReply";
pub const KIND_LOCAL_DISPATCH: &str = "localDispatch";
