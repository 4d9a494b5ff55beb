fn main() {
    if let Err(err) = table_builder::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
