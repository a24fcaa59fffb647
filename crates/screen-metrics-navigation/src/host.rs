use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use screen_metrics::{ScreenContainer, ScreenInfo, ScreenMetricsTracer, SurfaceId};

use crate::attach::{attach_performance_tracer, TracerAttachment};

/// Navigation host whose child screens are traced automatically.
///
/// The host publishes its own lifecycle on [`TraceableNavHost::lifecycle`]
/// and its children's on [`TraceableNavHost::children`]. Only the top of
/// the back stack is started; everything below it is stopped.
pub struct TraceableNavHost {
    screen: ScreenInfo,
    surface: SurfaceId,
    lifecycle: ScreenContainer,
    children: Arc<ScreenContainer>,
    back_stack: Mutex<Vec<ScreenInfo>>,
    attachment: TracerAttachment,
}

impl TraceableNavHost {
    pub fn new(
        name: impl Into<String>,
        surface: SurfaceId,
        tracer: ScreenMetricsTracer,
    ) -> Self {
        let screen = ScreenInfo::named(name);
        let lifecycle = ScreenContainer::new();
        let children = Arc::new(ScreenContainer::new());
        let attachment =
            attach_performance_tracer(&screen, &lifecycle, children.clone(), tracer);

        Self {
            screen,
            surface,
            lifecycle,
            children,
            back_stack: Mutex::new(Vec::new()),
            attachment,
        }
    }

    fn back_stack(&self) -> MutexGuard<'_, Vec<ScreenInfo>> {
        self.back_stack
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn screen(&self) -> &ScreenInfo {
        &self.screen
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn lifecycle(&self) -> &ScreenContainer {
        &self.lifecycle
    }

    pub fn children(&self) -> &Arc<ScreenContainer> {
        &self.children
    }

    pub fn tracer(&self) -> &ScreenMetricsTracer {
        self.attachment.tracer()
    }

    pub fn current(&self) -> Option<ScreenInfo> {
        self.back_stack().last().cloned()
    }

    pub fn depth(&self) -> usize {
        self.back_stack().len()
    }

    pub fn create(&self) {
        self.lifecycle.screen_created(&self.screen, Some(self.surface));
    }

    /// Push `screen`, stopping whatever was on top.
    pub fn navigate(&self, screen: ScreenInfo) {
        let covered = {
            let mut stack = self.back_stack();
            let covered = stack.last().cloned();
            stack.push(screen.clone());
            covered
        };

        if let Some(covered) = covered {
            self.children.screen_stopped(&covered, Some(self.surface));
        }
        self.children.screen_created(&screen, Some(self.surface));
        self.children.screen_started(&screen, Some(self.surface));
        log::debug!("{} navigated to {}", self.screen, screen);
    }

    /// Pop the top screen and restart the one it covered.
    pub fn pop(&self) -> Option<ScreenInfo> {
        let (popped, revealed) = {
            let mut stack = self.back_stack();
            let popped = stack.pop()?;
            (popped, stack.last().cloned())
        };

        self.children.screen_stopped(&popped, Some(self.surface));
        self.children.screen_destroyed(&popped, Some(self.surface));
        if let Some(revealed) = revealed {
            self.children.screen_started(&revealed, Some(self.surface));
        }
        Some(popped)
    }

    /// Stop and destroy every child, then destroy the host itself.
    pub fn destroy(&self) {
        let stack = std::mem::take(&mut *self.back_stack());

        if let Some(top) = stack.last() {
            self.children.screen_stopped(top, Some(self.surface));
        }
        for screen in stack.iter().rev() {
            self.children.screen_destroyed(screen, Some(self.surface));
        }
        self.lifecycle.screen_destroyed(&self.screen, Some(self.surface));
    }
}
