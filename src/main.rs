fn main() -> Result<(), Box<dyn std::error::Error>> {
    quillpad::cli::main()
}
