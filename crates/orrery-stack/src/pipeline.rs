//! Stage orchestration
//!
//! Frames coming off the link pass Security, Locator, Timekeeper, Router,
//! Manager, in that order; locally originated frames are marshaled in the
//! reverse protocol order Manager, Router, Locator, Timekeeper, Security.
//! Before the receive pass the pipeline classifies the frame against its
//! destination region, the role the link layer's addressing played in the
//! reference design.

use std::sync::Arc;

use tracing::trace;

use crate::{destination, Buffer, Clock, Positioner, Stage};

pub struct Pipeline {
    receive_order: Vec<Arc<dyn Stage>>,
    marshal_order: Vec<Arc<dyn Stage>>,
    positioner: Arc<Positioner>,
    clock: Arc<Clock>,
}

impl Pipeline {
    pub fn new(
        security: Arc<dyn Stage>,
        locator: Arc<dyn Stage>,
        timekeeper: Arc<dyn Stage>,
        router: Arc<dyn Stage>,
        manager: Arc<dyn Stage>,
        positioner: Arc<Positioner>,
        clock: Arc<Clock>,
    ) -> Self {
        Pipeline {
            receive_order: vec![
                security.clone(),
                locator.clone(),
                timekeeper.clone(),
                router.clone(),
                manager.clone(),
            ],
            marshal_order: vec![manager, router, locator, timekeeper, security],
            positioner,
            clock,
        }
    }

    /// Run the receive pass over a frame
    pub fn receive(&self, buf: &mut Buffer) {
        // destined_to_me is classified once per full frame, before any stage
        // runs; microframes carry no destination to classify against
        if !buf.is_microframe {
            let here = self.positioner.here();
            let now = self.clock.now();
            let dst = destination(&buf.message, here, now);
            buf.destined_to_me =
                buf.message.header.origin.space != here && dst.contains(&here, dst.t0);
        }

        for stage in &self.receive_order {
            trace!(stage = stage.name(), "receive");
            stage.on_receive(buf);
        }
    }

    /// Run the marshal pass over a locally originated frame
    pub fn marshal(&self, buf: &mut Buffer) {
        for stage in &self.marshal_order {
            trace!(stage = stage.name(), "marshal");
            stage.on_marshal(buf);
        }
    }
}
