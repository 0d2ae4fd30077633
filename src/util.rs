const DEFAULT_SSH_PORT: u16 = 22;

pub fn get_default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

const TEST_MODE: &str = "TEST_MODE";

pub fn get_test_mode() -> Option<bool> {
    std::env::var(TEST_MODE)
        .ok()
        .map(|value| value.eq_ignore_ascii_case("true"))
}

const TEST_CPU: &str = "TEST_CPU";
const TEST_RAM: &str = "TEST_RAM";
const TEST_DISK: &str = "TEST_DISK";

pub fn get_test_cpu() -> Option<f64> {
    parse_env(TEST_CPU)
}

pub fn get_test_ram() -> Option<f64> {
    parse_env(TEST_RAM)
}

pub fn get_test_disk() -> Option<f64> {
    parse_env(TEST_DISK)
}

const SMTP_PASSWORD: &str = "SMTP_PASSWORD";

pub fn get_smtp_password() -> Option<String> {
    std::env::var(SMTP_PASSWORD).ok()
}

fn parse_env(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
