use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

// Unbounded single-threaded channel used as the executor's ready queue.

#[derive(Clone)]
pub(crate) struct Sender<T> {
    data: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Sender<T> {
    pub fn send(&self, value: T) {
        self.data.borrow_mut().push_back(value);
    }
}

pub(crate) struct Receiver<T> {
    data: Rc<RefCell<VecDeque<T>>>,
}

impl<T> Receiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.data.borrow_mut().pop_front()
    }
}

pub(crate) fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let data = Rc::new(RefCell::new(VecDeque::new()));
    (Sender { data: data.clone() }, Receiver { data })
}
