/// Initial state. The job was submitted but scheduling has not started yet.
#[derive(Debug, Default)]
pub struct Created;

impl Created {
    pub fn new() -> Self {
        Created
    }
}
