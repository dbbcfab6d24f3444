//! WebDriver BiDi script value exchange (Rust)
//!
//! Provides the pieces needed to move values between a test and a remote
//! JavaScript realm:
//! - Encoding local value trees into protocol nodes
//! - Decoding remote results, capturing handles to remote objects
//! - Deep comparison of value trees
//! - Driving `script.callFunction` / `script.evaluate` invocations

pub mod codec;
pub mod compare;
pub mod error;
pub mod handles;
pub mod invoker;
pub mod services;
pub mod transport;
pub mod types;
pub mod value;

// Re-exports
pub use codec::{decode_node, ResultOrigin, ValueDecoder, ValueEncoder};
pub use compare::{recursive_compare, RecursiveComparator};
pub use error::{MismatchError, MismatchKind, ScriptError, ScriptResult};
pub use handles::{HandleDescriptor, HandleRegistry};
pub use invoker::{CallFunction, CallFunctionInvoker, Evaluate};
pub use services::ScriptSession;
pub use transport::Transport;
pub use types::*;
pub use value::{Handle, HandleId, NumberValue, RealmId, RegExpValue, RemoteValue, Value};
