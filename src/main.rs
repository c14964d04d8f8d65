fn main() {
    msgbus::app::startup::startup();
}
