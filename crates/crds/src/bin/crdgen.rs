//! Prints the Webserver CRD manifest as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/webserver.yaml`

use crds::Webserver;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Webserver::crd())?);
    Ok(())
}
