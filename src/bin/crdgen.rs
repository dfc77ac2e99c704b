//! CRD YAML Generator
//!
//! This binary generates Kubernetes CRD manifests for all custom resources
//! defined by the declarative reconciler.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/all.yaml

use declarative_reconciler::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
