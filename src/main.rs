use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    fanfuse::cli::main()
}
