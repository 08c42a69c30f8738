//! Forward streaming iterator over a sorted run, block by block.
//! Compaction and cursor snapshots consume it.

use strata_core::error::Result;

use crate::record::Record;
use crate::sstable::reader::{Block, RunReader};

pub struct RunIterator<'a> {
    reader: &'a RunReader,
    next_block_idx: usize,
    current_block: Option<Block>,
    current_entry_idx: usize,
}

impl<'a> RunIterator<'a> {
    pub(crate) fn new(reader: &'a RunReader) -> Self {
        Self {
            reader,
            next_block_idx: 0,
            current_block: None,
            current_entry_idx: 0,
        }
    }

    fn load_next_block(&mut self) -> Result<bool> {
        if self.next_block_idx >= self.reader.block_count() {
            self.current_block = None;
            return Ok(false);
        }

        let block = self.reader.load_block(self.next_block_idx)?;
        self.next_block_idx += 1;
        self.current_entry_idx = 0;
        self.current_block = Some(block);
        Ok(true)
    }
}

impl<'a> Iterator for RunIterator<'a> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(block) = &self.current_block {
                if self.current_entry_idx < block.len() {
                    let record = block.record_at(self.current_entry_idx);
                    self.current_entry_idx += 1;
                    return Some(record);
                }
                self.current_block = None;
            }

            match self.load_next_block() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
