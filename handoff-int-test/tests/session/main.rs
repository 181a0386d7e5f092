mod channel_test;
mod coordinator_test;
mod handoff_test;

// Setup only one time throughout the test binary.
#[ctor::ctor]
fn init() {
    colog::init();
}
