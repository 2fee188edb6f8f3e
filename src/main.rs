fn main() {
    thickness_report::cli::run();
}
