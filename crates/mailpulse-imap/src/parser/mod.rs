//! Sans-I/O decoding of monitor connection traffic.
//!
//! The monitor never parses full IMAP grammar. Each server line is classified
//! by [`classify`] into a borrowed [`ResponseLine`], and the few payloads the
//! monitor cares about get a dedicated decoder:
//!
//! - [`parse_status_att_list`] for NOTIFY STATUS pushes
//! - [`decode_header_value`] for `From`/`Subject` inside FETCH literals
//!
//! # Example
//!
//! ```
//! use mailpulse_imap::command::TagCycle;
//! use mailpulse_imap::parser::{ResponseLine, classify, parse_status_att_list};
//!
//! let line = "* STATUS \"INBOX.Lists\" (MESSAGES 4 UNSEEN 1)\r\n";
//! match classify(line, &TagCycle::default()).unwrap() {
//!     ResponseLine::Status { mailbox, attributes } => {
//!         assert_eq!(mailbox, "INBOX.Lists");
//!         let decoded = parse_status_att_list(attributes).unwrap();
//!         assert_eq!(decoded.status.messages, Some(4));
//!     }
//!     _ => panic!("Expected STATUS"),
//! }
//! ```

mod header;
mod line;
mod status;

pub use header::decode_header_value;
pub use line::{Completion, HeaderField, NumericEvent, ResponseLine, classify};
pub use status::{
    DecodedStatus, decode_mailbox_name, find_attribute_list, host_path, parse_status_att_list,
};
