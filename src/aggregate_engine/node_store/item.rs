use crate::{
    aggregate_engine::node_store::Summand,
    aggregate_engine::position::{Position, Value},
};
use serde::{Deserialize, Serialize};

/// A tree entry: its unique position, the value stored with it, and its summand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub position: Position,
    pub value: Value,
    pub summand: Summand,
}

impl Item {
    pub fn new(position: Position, value: Value, summand: Summand) -> Self {
        Self { position, value, summand }
    }
}
