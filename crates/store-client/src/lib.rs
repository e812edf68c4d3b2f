//! Object Store Client
//!
//! The boundary between the webserver reconciler and the cluster's object
//! store. Provides typed get/create/update for the dependent kinds the
//! operator manages, plus status writes for the owning `Webserver`.
//!
//! # Example
//!
//! ```no_run
//! use store_client::{KubeObjectStore, ObjectKey, ObjectKind, ObjectStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeObjectStore::new(client);
//!
//! let key = ObjectKey::new(ObjectKind::Deployment, "default", "demo-deployment");
//! if let Some(existing) = store.get(&key).await? {
//!     println!("found {}", existing.key());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Closed kind set**: Deployment, Service and ConfigMap via `DependentObject`
//! - **Error taxonomy**: conflicts, transient faults and rejections are told apart
//! - **Mocking**: `MockObjectStore` (feature `test-util`) keeps objects in memory

pub mod client;
pub mod error;
pub mod object;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeObjectStore;
pub use error::StoreError;
pub use object::{DependentObject, ObjectKey, ObjectKind};
pub use store_trait::ObjectStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockObjectStore, StoreOperation, WriteRecord};
