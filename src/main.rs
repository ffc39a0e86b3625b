fn main() {
    if let Err(err) = ber_stock::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
