fn main() {
    // Only the ESP-IDF target needs the toolchain environment; host builds run
    // the simulated pipeline.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
