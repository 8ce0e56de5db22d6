fn main() {
    std::process::exit(spigot_runner_lib::run());
}
