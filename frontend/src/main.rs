fn main() {
    checkin_frontend::run();
}
