/// Progress update callbacks for a running dump transfer
pub trait ProgressCallbacks {
    /// Begin reporting a transfer of `total` bytes starting at `address`
    fn init(&mut self, address: u32, total: usize);
    /// Update with the number of bytes assembled so far
    fn update(&mut self, received: usize);
    /// Mark the transfer as finished
    fn finish(&mut self, success: bool);
}
