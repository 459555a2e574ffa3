fn main() {
    if let Err(err) = adaptive_mines_lib::run() {
        log::error!("adaptive-mines failed: {err:#}");
        eprintln!("adaptive-mines: {err:#}");
        std::process::exit(1);
    }
}
