fn main() {
    if let Err(err) = sales_view::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
