fn main() {
    scan_preprocess::cli::run();
}
