fn main() {
    if let Err(err) = formcast::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
