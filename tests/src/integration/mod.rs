//! End-to-end scenarios over the in-process node.

pub mod fixtures;

#[cfg(test)]
mod convergence;
#[cfg(test)]
mod isolation;
#[cfg(test)]
mod rebalance;
#[cfg(test)]
mod reconnect;
