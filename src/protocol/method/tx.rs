//! `tx` class methods. None of them take arguments.

use super::empty_args;
use crate::protocol::constants::CLASS_TX;

/// `tx.select`: make the channel transactional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxSelect;
empty_args!(TxSelect, CLASS_TX, 10, "tx.select");

/// `tx.select-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxSelectOk;
empty_args!(TxSelectOk, CLASS_TX, 11, "tx.select-ok");

/// `tx.commit`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxCommit;
empty_args!(TxCommit, CLASS_TX, 20, "tx.commit");

/// `tx.commit-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxCommitOk;
empty_args!(TxCommitOk, CLASS_TX, 21, "tx.commit-ok");

/// `tx.rollback`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxRollback;
empty_args!(TxRollback, CLASS_TX, 30, "tx.rollback");

/// `tx.rollback-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxRollbackOk;
empty_args!(TxRollbackOk, CLASS_TX, 31, "tx.rollback-ok");
