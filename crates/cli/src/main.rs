fn main() -> Result<(), Box<dyn std::error::Error>> {
    alscope_cli::run()
}
