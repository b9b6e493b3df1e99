//! Build script to track include_str! dependencies.
//! This ensures cargo rebuilds when embedded resources change.

fn main() {
    println!("cargo:rerun-if-changed=resources/demo_tickets.json");
}
