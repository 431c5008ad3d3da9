fn main() {
    duet::cli::run();
}
