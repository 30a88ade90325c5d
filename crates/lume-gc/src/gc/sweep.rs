//! Sweeping: the string table bucket by bucket, then the root list in
//! batches.

use crate::config::SWEEP_MAX;
use crate::heap::Heap;

use super::Phase;

impl Heap {
    /// Sweep one bucket of the string table.
    pub(crate) fn sweep_string_step(&mut self) {
        let before = self.accounting.total;
        let bucket = self.gc.sweep_string_cursor;
        let outcome = self.strings.sweep_bucket(
            bucket,
            &mut self.objects,
            &mut self.accounting,
            self.gc.current_white,
        );
        self.gc.metrics.strings_freed += outcome.freed;
        self.gc.metrics.bytes_freed += outcome.bytes;
        self.gc.sweep_string_cursor += 1;
        if self.gc.sweep_string_cursor >= self.strings.bucket_count() {
            self.gc.transition_to(Phase::Sweep);
        }
        let freed = before - self.accounting.total;
        self.accounting.estimate = self.accounting.estimate.saturating_sub(freed);
    }

    /// Sweep up to [`SWEEP_MAX`] objects of the root list, walking down
    /// from the cursor. Objects allocated since the flip sit above the
    /// cursor and are never visited.
    pub(crate) fn sweep_step(&mut self) {
        let before = self.accounting.total;
        let white = self.gc.current_white;
        for _ in 0..SWEEP_MAX {
            if self.gc.sweep_cursor == 0 {
                break;
            }
            self.gc.sweep_cursor -= 1;
            let i = self.gc.sweep_cursor;
            let r = self.gc.root_list[i];
            let header = &mut self.objects.get_mut(r).header;
            if header.is_fixed() {
                continue;
            }
            if header.is_dead(white) {
                let object = self.objects.remove(r);
                let size = object.size();
                self.accounting.release(size);
                self.gc.root_list.swap_remove(i);
                self.gc.metrics.objects_freed += 1;
                self.gc.metrics.bytes_freed += size;
                // Dropped here, payload and any unrun finalizer included.
                drop(object);
            } else {
                header.make_white(white);
            }
        }
        if self.gc.sweep_cursor == 0 {
            self.finish_sweep();
        }
        let freed = before - self.accounting.total;
        self.accounting.estimate = self.accounting.estimate.saturating_sub(freed);
    }

    fn finish_sweep(&mut self) {
        if self.strings.wants_shrink() {
            let size = self.strings.bucket_count() / 2;
            self.strings.resize(size);
        }
        // Userdata awaiting finalization are off the root list and were not
        // swept; whiten them so no black object outlives the cycle.
        let white = self.gc.current_white;
        for &u in &self.gc.pending_finalization {
            let header = &mut self.objects.get_mut(u).header;
            if !header.is_white() {
                header.make_white(white);
            }
        }
        #[cfg(feature = "tracing")]
        crate::gc::tracing::log_sweep_done(
            self.gc.gc_id,
            self.gc.metrics.objects_freed,
            self.gc.metrics.bytes_freed,
        );
        self.gc.transition_to(Phase::Finalize);
    }
}
