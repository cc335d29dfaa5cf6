fn main() {
    if let Err(err) = relation_scout::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
