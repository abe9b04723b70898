use crate::presenter::Presenter;

/// Aggregated "a request is outstanding" flag.
///
/// Starts out busy. Every emission drives label visibility; the spinner
/// ignores the initial emission so it does not flash on start-up.
#[derive(Debug)]
pub struct BusyState {
    busy: bool,
    emissions: u64,
}

impl Default for BusyState {
    fn default() -> Self {
        Self::new()
    }
}

impl BusyState {
    pub fn new() -> Self {
        Self {
            busy: true,
            emissions: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Emit the initial value.
    pub fn start(&mut self, presenter: &mut dyn Presenter) {
        self.emit(true, presenter);
    }

    pub fn emit(&mut self, busy: bool, presenter: &mut dyn Presenter) {
        self.busy = busy;
        if self.emissions > 0 {
            presenter.set_spinner(busy);
        }
        presenter.set_labels_hidden(busy);
        self.emissions += 1;
    }
}
