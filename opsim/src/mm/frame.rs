//! Physical frames.

use crate::Pid;

/// Index of a physical frame.
pub type FrameId = usize;

/// A physical frame and its current tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame index.
    pub id: FrameId,
    /// Owning process, if the frame is in use.
    pub owner: Option<Pid>,
    /// Virtual page of the owner held by the frame.
    pub virtual_page: Option<usize>,
}

impl Frame {
    pub(crate) const fn free(id: FrameId) -> Self {
        Self {
            id,
            owner: None,
            virtual_page: None,
        }
    }

    /// Returns true if no process holds the frame.
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    pub(crate) fn bind(&mut self, pid: Pid, virtual_page: usize) {
        self.owner = Some(pid);
        self.virtual_page = Some(virtual_page);
    }

    pub(crate) fn release(&mut self) -> Option<(Pid, usize)> {
        self.owner.take().zip(self.virtual_page.take())
    }
}
