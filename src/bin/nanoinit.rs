use anyhow::Result;

fn main() -> Result<()> {
    nanoinit::cli::run()
}
