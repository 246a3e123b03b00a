use std::collections::BTreeMap;
use std::future::Future;

use crate::replication::{Mode, WriteAck};
use crate::store::{PutOutcome, Record};
use crate::timestamp::Timestamp;
use crate::Result;

/// Operations every node exposes, whatever its role.
///
/// [`crate::Leader`] and [`crate::Follower`] are the two implementations;
/// the role is picked once when the node is built. Operations that belong to
/// the other role return [`crate::Error::UnsupportedOperation`].
pub trait KvsNode: Clone + Send + Sync + 'static {
    fn role(&self) -> Mode;

    /// Accept a client write. Leader only.
    fn write(&self, key: String, value: String) -> impl Future<Output = Result<WriteAck>> + Send;

    fn read(&self, key: &str) -> Option<Record>;

    fn read_all(&self) -> BTreeMap<String, String>;

    /// Merge a replicated write into the local store. Follower only.
    fn apply(&self, key: String, value: String, timestamp: Timestamp) -> Result<PutOutcome>;

    /// Replace the write quorum, returning the stored value. Leader only.
    fn set_quorum(&self, quorum: i64) -> Result<i64>;

    fn clear(&self);

    /// Wait for any background work the node still owns.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}
