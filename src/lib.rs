//! A Rust implementation of the online phase of the SPDZ protocol for secure multi-party
//! computation (MPC) over a prime field, with authenticated arithmetic secret sharing.
//!
//! Parties jointly evaluate arithmetic circuits on secret shared values without revealing them to
//! each other. Every share carries a share of an information-theoretic MAC under a global key that
//! nobody knows, so that any tampering with opened values is detected before a result is returned.
//!
//! ## Main Components
//!
//! The crate is structured into several modules:
//!
//! * [`field`] and [`data_types`]: field elements, authenticated shares and value handles.
//! * [`supplier`]: the preprocessed material (triples, bits, masks) the online phase consumes.
//! * [`native`]: the atomic operations (add, multiply, input, open, ...).
//! * [`producer`]: sequential, parallel and round-based composition of operations into protocol
//!   trees, independent of the protocol suite.
//! * [`factory`]: constructors for the native operations, used to write circuits.
//! * [`circuits`]: comparisons, lookups and sorting built on top of the factory.
//! * [`protocol`]: The [`protocol::mpc`] function, which runs a protocol tree for a single party.
//! * [`channel`]: Communication abstractions for exchanging data between parties.
//!
//! ## Basic Usage
//!
//! Each party builds the same protocol tree from its [`factory::SpdzFactory`], passing its own
//! inputs, and runs it with [`protocol::mpc`]. Output handles are set once `mpc` returns.
//!
//! For simulated environments (testing/development), you can use the [`protocol::simulate_mpc`]
//! function, which runs all parties with a trusted dealer:
//!
//! ```
//! use polytune_spdz::{
//!     config::Config,
//!     field::Fp,
//!     producer::Sequential,
//!     protocol::simulate_mpc,
//!     supplier::DealerConfig,
//! };
//!
//! let results = simulate_mpc(2, &Config::default(), &DealerConfig::new([0; 32]), |f| {
//!     let party = f.context().party;
//!     let (x, y, product, out) = (f.sint(), f.sint(), f.sint(), f.oint());
//!     let tree = Sequential::new()
//!         .then(f.input((party == 0).then(|| Fp::from(6u64)), 0, &x))
//!         .then(f.input((party == 1).then(|| Fp::from(7u64)), 1, &y))
//!         .then(f.mult(&x, &y, &product))
//!         .then(f.open(&product, &out));
//!     Ok((Box::new(tree) as _, out))
//! })?;
//! for result in results {
//!     assert_eq!(result.output.value()?, Fp::from(42u64));
//! }
//! # Ok::<(), polytune_spdz::protocol::Error>(())
//! ```
//!
//! ## Security Properties
//!
//! The online phase is secure against a malicious majority, assuming the preprocessed material is
//! generated securely. The included [`supplier::Dealer`] is a trusted dealer for testing only.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod circuits;
pub mod config;
pub mod data_types;
pub mod factory;
pub mod field;
pub mod native;
pub mod producer;
pub mod protocol;
pub mod supplier;

mod mac_check;
