fn main() {
    if let Err(err) = meter_consolidate::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
