//! The stage abstraction

use crate::Buffer;

/// One protocol part in the pipeline. `on_receive` runs for every frame
/// coming off the link, `on_marshal` for every locally originated frame
/// just before transmission. Both annotate the buffer in place.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_receive(&self, buf: &mut Buffer);

    fn on_marshal(&self, buf: &mut Buffer);
}
