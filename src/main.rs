use clap::Parser;
use possel::Args;

// --------------------------------------------------
fn main() {
    if let Err(e) = possel::run(Args::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
